pub mod backup;
pub mod hash;
