pub mod approval;
pub mod expense;
pub mod rules;
pub mod user;
