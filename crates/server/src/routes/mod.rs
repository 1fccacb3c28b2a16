pub mod appointments;
pub mod auth;
pub mod billing;
pub mod contact;
pub mod health;
pub mod medicines;
pub mod patients;
pub mod teeth;
pub mod tooth_treatments;
pub mod treatments;
