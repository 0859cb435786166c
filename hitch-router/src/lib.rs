pub mod fanout;
pub mod subscriptions;

pub use fanout::FanoutRouter;
pub use subscriptions::{Role, Subscription, Target};
