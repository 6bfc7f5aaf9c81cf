pub mod funds_blocker;
pub mod funds_checker;
pub mod mapper_resolver;
pub mod payment_dispatcher;
pub mod statement_processor;
