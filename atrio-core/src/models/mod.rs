pub mod audit;
pub mod conversation;
pub mod instance;
pub mod lead;
pub mod listing;
pub mod message;
pub mod principal;

pub use audit::AuditEntry;
pub use conversation::ConversationSummary;
pub use instance::Instance;
pub use lead::{Lead, LeadStage};
pub use listing::Listing;
pub use message::{Direction, Message};
pub use principal::{Principal, Role};
