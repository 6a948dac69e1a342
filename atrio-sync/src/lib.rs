pub mod coalesce;
pub mod cursor;
pub mod event;
pub mod live_list;
pub mod registry;
pub mod scope;

pub use coalesce::Coalescer;
pub use cursor::{Direction, Page, PageCursor};
pub use event::{ChangeEvent, ChangeOp, ChangePayload, EventError, KeyedRow};
pub use live_list::{LiveList, SortOrder};
pub use registry::{Subscription, SubscriptionRegistry};
pub use scope::{Scope, ScopeGen};
