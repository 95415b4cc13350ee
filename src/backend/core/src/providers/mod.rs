//! External providers the job pipelines call out to.
//!
//! Each capability is a trait so queues can be driven by test doubles; the
//! concrete clients talk to the hosted Supabase services over `reqwest`.

pub mod auth_email;
pub mod storage;

pub use auth_email::{EmailService, SupabaseAuthEmailService};
pub use storage::{object_key, BlobStorage, SupabaseStorage};
