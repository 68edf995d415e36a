pub mod feed;
pub mod home;
pub mod post;
pub mod profile;
pub mod search;
pub mod submission;
