pub mod approvals;
pub mod auth;
pub mod budget;
pub mod debts;
pub mod history;
pub mod members;
pub mod participants;
pub mod payments;
pub mod projects;
pub mod recovery;
pub mod users;
