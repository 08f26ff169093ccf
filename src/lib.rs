// Baby Naming - Core Library
// Exposes all modules for use in CLI, API server, and tests

pub mod bazi;       // Four Pillars + five-element profile
pub mod naming;     // Request model, validation, prompts
pub mod page;
pub mod library;    // Curated character table
pub mod llm;        // Text-generation client
pub mod expert;     // Naming orchestration
pub mod db;
pub mod auth;       // WeChat login
pub mod config;

#[cfg(feature = "server")]
pub mod api;

// Re-export commonly used types
pub use bazi::{
    compute_from_str, compute_pillars, parse_birth_date,
    BaziError, BaziResult, BaziSummary, EarthlyBranch, Element, FiveElementProfile,
    HeavenlyStem, Pillar,
};
pub use naming::{
    build_analysis_prompt, build_naming_prompt,
    CustomOptions, Gender, NameAnalysis, NameCandidate, NameType, NamingRequest, NamingStyle,
    ValidationError,
};
pub use page::Page;
pub use library::{CharacterEntry, CharacterLibrary, GenderTendency, LibraryQuery};
pub use llm::{DeepSeekClient, GenerationOptions, LlmConfig, LlmError, TextGenerator};
pub use expert::{ExpertError, NamingExpert, NamingOutcome};
pub use db::{
    Event, Favorite, FavoriteKind, HistoryEntry, HistoryRecord, User,
    open_database, setup_database, insert_event, get_events_for_entity,
};
pub use auth::{AuthError, WeChatClient, WxSession};
pub use config::ServerArgs;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
