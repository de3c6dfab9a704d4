pub mod dispute;
pub mod note;
pub mod rating;
pub mod score;
