//! Content records: posts, comments, user profiles and the datastore VM inventory.

pub mod comments;
pub mod posts;
pub mod profiles;
pub mod vm;

pub use comments::{Comment, CommentStore, NewComment};
pub use posts::{NewPost, Post, PostStore, PostUpdate, Visibility};
pub use profiles::{Profile, ProfileStore, ProfileUpdate};
pub use vm::{VmData, VmRecord, VmStore};
