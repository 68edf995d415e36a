use std::collections::HashMap;

use rhythm_core::{Post, PostId};

/// Posts already fetched by a feed, for reopening them without a round trip.
/// Entries are never evicted one by one; the whole cache goes on a filter reset.
#[derive(Debug, Clone, Default)]
pub struct PostCache {
    pub(crate) posts: HashMap<PostId, Post>,
}

impl PostCache {
    pub fn new() -> Self {
        Self {
            posts: HashMap::new(),
        }
    }

    pub fn get(&self, id: &str) -> Option<&Post> {
        self.posts.get(id)
    }

    pub fn insert(&mut self, post: Post) {
        self.posts.insert(post.id.clone(), post);
    }

    pub fn extend<'a>(&mut self, posts: impl IntoIterator<Item = &'a Post>) {
        for post in posts {
            self.insert(post.clone());
        }
    }

    pub fn clear(&mut self) {
        self.posts.clear();
    }

    pub fn len(&self) -> usize {
        self.posts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.posts.is_empty()
    }
}
