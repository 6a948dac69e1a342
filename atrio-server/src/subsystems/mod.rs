pub mod audit;
pub mod conversations;
pub mod feed;
pub mod import;
pub mod instances;
pub mod leads;
pub mod listings;
pub mod messages;
pub mod relay;
