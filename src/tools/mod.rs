pub mod dedent;
pub mod image;
