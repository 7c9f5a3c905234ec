//! Conversational Dungeon Master engine.
//!
//! This crate provides:
//! - A staged turn-processing pipeline (intent classification, validation,
//!   narrative state mutation, LLM generation, mechanics application) driven
//!   by a fixed capability set injected at construction time.
//! - A tiered memory subsystem (working, episodic, summary, entity-fact)
//!   with vector retrieval and token-budgeted context assembly.
//! - D&D 5e dice rolling, character/campaign data models, and JSON-backed
//!   reference persistence.
//!
//! # Quick Start
//!
//! ```ignore
//! use dnd_core::{Capabilities, Core, ProcessMessageRequest};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let capabilities = Capabilities {
//!         embedder: Box::new(my_embedder),
//!         generator: Box::new(my_generator),
//!         memory_store: Box::new(my_memory_store),
//!         session_store: Box::new(my_session_store),
//!         campaign_store: Box::new(my_campaign_store),
//!         character_store: Box::new(my_character_store),
//!         significance_classifier: Box::new(my_significance_classifier),
//!         intent_classifier: Box::new(my_intent_classifier),
//!     };
//!     let core = Core::new(capabilities);
//!
//!     let response = core
//!         .process_message(ProcessMessageRequest {
//!             session_id: "s1".into(),
//!             user_id: "u1".into(),
//!             character_id: "c1".into(),
//!             message: "I look around the tavern.".into(),
//!             world_id: None,
//!             campaign_module_id: None,
//!         })
//!         .await?;
//!     println!("{}", response.dm_response);
//!     Ok(())
//! }
//! ```

pub mod campaign;
pub mod capabilities;
pub mod character;
pub mod dice;
pub mod error;
pub mod memory;
pub mod pipeline;
pub mod state;
pub mod testing;

// Primary public API
pub use capabilities::{
    CampaignStore, Capabilities, CharacterStore, Embedder, GeneratedReply, Generator,
    IntentClassifier, MemoryStore, SessionStore, SignificanceClassifier, SignificanceScore,
};
pub use character::CharacterView;
pub use error::CoreError;
pub use pipeline::{Core, ProcessMessageRequest, ProcessMessageResponse};
pub use state::{GameMode, Session};
