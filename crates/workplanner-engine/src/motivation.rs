//! Motivation board: shout-outs, goals, achievements and inspiration posts
//! with likes, comments and pinning.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::str::FromStr;
use workplanner_core::{FieldError, Identity, PlannerError, Result};

use crate::persistence::PlannerDb;
use crate::users::UserSummary;

pub const MAX_TITLE_LEN: usize = 100;
pub const MAX_CONTENT_LEN: usize = 500;
pub const MAX_COMMENT_LEN: usize = 200;
pub const MAX_TAGS: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PostType {
    Shoutout,
    Goal,
    Achievement,
    Inspiration,
}

impl PostType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PostType::Shoutout => "shoutout",
            PostType::Goal => "goal",
            PostType::Achievement => "achievement",
            PostType::Inspiration => "inspiration",
        }
    }
}

impl FromStr for PostType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "shoutout" => Ok(PostType::Shoutout),
            "goal" => Ok(PostType::Goal),
            "achievement" => Ok(PostType::Achievement),
            "inspiration" => Ok(PostType::Inspiration),
            other => Err(format!("Invalid post type: {other}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Like {
    pub user_id: String,
    pub liked_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Comment {
    pub id: String,
    pub user_id: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Post {
    pub id: String,
    pub post_type: PostType,
    pub title: String,
    pub content: String,
    pub author_id: String,
    pub target_user_id: Option<String>,
    pub department: String,
    pub tags: Vec<String>,
    pub is_public: bool,
    pub is_pinned: bool,
    pub likes: Vec<Like>,
    pub comments: Vec<Comment>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Post {
    pub fn visible_to(&self, viewer: &Identity) -> bool {
        self.is_public || self.department == viewer.department
    }
}

fn default_public() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewPost {
    #[serde(rename = "type")]
    pub post_type: PostType,
    pub title: String,
    pub content: String,
    #[serde(default)]
    pub target_user: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default = "default_public")]
    pub is_public: bool,
}

impl NewPost {
    pub fn validate(&self) -> Result<()> {
        let mut errors = Vec::new();
        let title = self.title.trim().chars().count();
        if title == 0 || title > MAX_TITLE_LEN {
            errors.push(FieldError::new(
                "title",
                "Title is required and must be 1-100 characters",
            ));
        }
        let content = self.content.trim().chars().count();
        if content == 0 || content > MAX_CONTENT_LEN {
            errors.push(FieldError::new(
                "content",
                "Content is required and must be 1-500 characters",
            ));
        }
        if self.tags.len() > MAX_TAGS {
            errors.push(FieldError::new("tags", "At most 10 tags are allowed"));
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(PlannerError::Validation(errors))
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentView {
    pub id: String,
    pub user: UserSummary,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PostView {
    pub id: String,
    #[serde(rename = "type")]
    pub post_type: PostType,
    pub title: String,
    pub content: String,
    pub author: UserSummary,
    pub target_user: Option<UserSummary>,
    pub department: String,
    pub tags: Vec<String>,
    pub is_public: bool,
    pub is_pinned: bool,
    pub like_count: usize,
    pub liked_by_me: bool,
    pub comments: Vec<CommentView>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

pub struct MotivationBoard {
    db: Arc<PlannerDb>,
}

impl MotivationBoard {
    pub fn new(db: Arc<PlannerDb>) -> Self {
        Self { db }
    }

    pub async fn create(&self, caller: &Identity, input: NewPost) -> Result<PostView> {
        input.validate()?;
        let now = Utc::now();
        let post = Post {
            id: uuid::Uuid::new_v4().to_string(),
            post_type: input.post_type,
            title: input.title.trim().to_string(),
            content: input.content.trim().to_string(),
            author_id: caller.user_id.clone(),
            target_user_id: input.target_user.filter(|t| !t.is_empty()),
            department: caller.department.clone(),
            tags: input
                .tags
                .iter()
                .map(|t| t.trim().to_string())
                .filter(|t| !t.is_empty())
                .collect(),
            is_public: input.is_public,
            is_pinned: false,
            likes: Vec::new(),
            comments: Vec::new(),
            created_at: now,
            updated_at: now,
        };
        self.db.insert_post(&post)?;
        tracing::info!(post_id = %post.id, author = %caller.user_id, kind = post.post_type.as_str(), "post created");
        self.view(post, caller)
    }

    /// Public posts plus the caller's department, pinned first then newest.
    pub async fn list(&self, caller: &Identity) -> Result<Vec<PostView>> {
        let posts = self.db.list_visible_posts(&caller.department)?;
        self.populate(posts, caller)
    }

    pub async fn toggle_like(&self, caller: &Identity, post_id: &str) -> Result<PostView> {
        self.load_visible(caller, post_id)?;
        let liked = self.db.toggle_like(post_id, &caller.user_id, Utc::now())?;
        tracing::debug!(post_id, user_id = %caller.user_id, liked, "like toggled");
        self.reload(caller, post_id)
    }

    pub async fn add_comment(&self, caller: &Identity, post_id: &str, content: &str) -> Result<PostView> {
        let content = content.trim();
        let len = content.chars().count();
        if len == 0 || len > MAX_COMMENT_LEN {
            return Err(PlannerError::invalid(
                "content",
                "Comment must be 1-200 characters",
            ));
        }
        self.load_visible(caller, post_id)?;
        let comment = Comment {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: caller.user_id.clone(),
            content: content.to_string(),
            created_at: Utc::now(),
        };
        self.db.insert_comment(post_id, &comment)?;
        self.reload(caller, post_id)
    }

    /// Approvers of the post's department (or admins) pin and unpin.
    pub async fn set_pinned(&self, caller: &Identity, post_id: &str, pinned: bool) -> Result<PostView> {
        let post = self.load_visible(caller, post_id)?;
        if !caller.can_pin_post(&post.department) {
            return Err(PlannerError::Forbidden(
                "Not authorized to pin posts of this department".into(),
            ));
        }
        self.db.set_post_pinned(post_id, pinned, Utc::now())?;
        tracing::info!(post_id, pinned, by = %caller.user_id, "post pin changed");
        self.reload(caller, post_id)
    }

    /// Posts the caller cannot see are reported as missing.
    fn load_visible(&self, caller: &Identity, post_id: &str) -> Result<Post> {
        self.db
            .get_post(post_id)?
            .filter(|p| p.visible_to(caller))
            .ok_or_else(|| PlannerError::NotFound("Post".into()))
    }

    fn reload(&self, caller: &Identity, post_id: &str) -> Result<PostView> {
        let post = self.load_visible(caller, post_id)?;
        self.view(post, caller)
    }

    fn view(&self, post: Post, caller: &Identity) -> Result<PostView> {
        Ok(self.populate(vec![post], caller)?.remove(0))
    }

    fn populate(&self, posts: Vec<Post>, caller: &Identity) -> Result<Vec<PostView>> {
        let ids = posts.iter().flat_map(|p| {
            std::iter::once(p.author_id.as_str())
                .chain(p.target_user_id.as_deref())
                .chain(p.comments.iter().map(|c| c.user_id.as_str()))
        });
        let users = self.db.users_by_ids(ids)?;
        let summary = |id: &str| {
            users
                .get(id)
                .cloned()
                .unwrap_or_else(|| UserSummary::unknown(id))
        };
        Ok(posts
            .into_iter()
            .map(|p| PostView {
                author: summary(&p.author_id),
                target_user: p.target_user_id.as_deref().map(summary),
                like_count: p.likes.len(),
                liked_by_me: p.likes.iter().any(|l| l.user_id == caller.user_id),
                comments: p
                    .comments
                    .iter()
                    .map(|c| CommentView {
                        id: c.id.clone(),
                        user: summary(&c.user_id),
                        content: c.content.clone(),
                        created_at: c.created_at,
                    })
                    .collect(),
                id: p.id,
                post_type: p.post_type,
                title: p.title,
                content: p.content,
                department: p.department,
                tags: p.tags,
                is_public: p.is_public,
                is_pinned: p.is_pinned,
                created_at: p.created_at,
                updated_at: p.updated_at,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use workplanner_core::Role;

    fn setup() -> (MotivationBoard, Arc<PlannerDb>) {
        let db = Arc::new(PlannerDb::open_in_memory().unwrap());
        (MotivationBoard::new(db.clone()), db)
    }

    fn post(title: &str, public: bool) -> NewPost {
        NewPost {
            post_type: PostType::Shoutout,
            title: title.into(),
            content: "Thanks for covering the release on Friday!".into(),
            target_user: None,
            tags: vec!["teamwork".into()],
            is_public: public,
        }
    }

    #[test]
    fn test_new_post_defaults_to_public() {
        let input: NewPost =
            serde_json::from_str(r#"{"type":"goal","title":"Ship it","content":"By Friday"}"#).unwrap();
        assert!(input.is_public);
        assert_eq!(input.post_type, PostType::Goal);
        assert!(serde_json::from_str::<NewPost>(r#"{"type":"rant","title":"x","content":"y"}"#).is_err());
    }

    #[test]
    fn test_new_post_validation() {
        let mut input = post("   ", true);
        input.content = "x".repeat(501);
        let PlannerError::Validation(fields) = input.validate().unwrap_err() else {
            panic!("expected validation error");
        };
        assert_eq!(fields.len(), 2);
    }

    #[tokio::test]
    async fn test_visibility_and_ordering() {
        let (board, db) = setup();
        let eng = Identity::new("u1", "eng", Role::Worker).with_name("Uma");
        let sales = Identity::new("u2", "sales", Role::Worker);
        let eng_manager = Identity::new("m1", "eng", Role::Manager);
        db.upsert_user(&eng).unwrap();

        let public = board.create(&eng, post("Public kudos", true)).await.unwrap();
        let private = board.create(&eng, post("Team only", false)).await.unwrap();
        assert_eq!(public.author.name, "Uma");

        let seen_by_sales = board.list(&sales).await.unwrap();
        assert_eq!(seen_by_sales.len(), 1);
        assert_eq!(seen_by_sales[0].id, public.id);

        let err = board.toggle_like(&sales, &private.id).await.unwrap_err();
        assert!(matches!(err, PlannerError::NotFound(_)));

        board.set_pinned(&eng_manager, &public.id, true).await.unwrap();
        let seen_by_eng = board.list(&eng).await.unwrap();
        assert_eq!(seen_by_eng.len(), 2);
        assert_eq!(seen_by_eng[0].id, public.id);
        assert!(seen_by_eng[0].is_pinned);
    }

    #[tokio::test]
    async fn test_like_toggles() {
        let (board, _db) = setup();
        let author = Identity::new("u1", "eng", Role::Worker);
        let fan = Identity::new("u2", "sales", Role::Worker);
        let created = board.create(&author, post("Release done", true)).await.unwrap();

        let liked = board.toggle_like(&fan, &created.id).await.unwrap();
        assert_eq!(liked.like_count, 1);
        assert!(liked.liked_by_me);

        let unliked = board.toggle_like(&fan, &created.id).await.unwrap();
        assert_eq!(unliked.like_count, 0);
        assert!(!unliked.liked_by_me);
    }

    #[tokio::test]
    async fn test_comments_and_pin_permissions() {
        let (board, _db) = setup();
        let author = Identity::new("u1", "eng", Role::Worker);
        let other_manager = Identity::new("m2", "sales", Role::Manager);
        let admin = Identity::new("a1", "hr", Role::Admin);
        let created = board.create(&author, post("Hit our goal", true)).await.unwrap();

        let err = board.add_comment(&author, &created.id, "").await.unwrap_err();
        assert!(matches!(err, PlannerError::Validation(_)));
        let err = board
            .add_comment(&author, &created.id, &"x".repeat(201))
            .await
            .unwrap_err();
        assert!(matches!(err, PlannerError::Validation(_)));

        let view = board.add_comment(&other_manager, &created.id, " Well done! ").await.unwrap();
        assert_eq!(view.comments.len(), 1);
        assert_eq!(view.comments[0].content, "Well done!");

        let err = board.set_pinned(&other_manager, &created.id, true).await.unwrap_err();
        assert!(matches!(err, PlannerError::Forbidden(_)));
        let err = board.set_pinned(&author, &created.id, true).await.unwrap_err();
        assert!(matches!(err, PlannerError::Forbidden(_)));
        assert!(board.set_pinned(&admin, &created.id, true).await.unwrap().is_pinned);
    }
}
