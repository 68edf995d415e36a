pub mod error;
pub mod post;
pub mod query;
pub mod social;
pub mod source;

pub use error::*;
pub use post::{ContentKind, LengthBucket, NewPost, Post, PostChanges, PostId, PostStatus};
pub use source::{EngagementSource, PostPage, PostSource, ProfileSource};
