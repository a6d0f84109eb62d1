pub mod auto_invest;
pub mod roundup;
pub mod user_locks;
pub mod user_state;
