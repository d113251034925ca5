use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Fixed set of post categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Category {
    Agriculture,
    Business,
    Education,
    Entertainment,
    Art,
    Investment,
    Weather,
}

impl Category {
    pub const ALL: [Category; 7] = [
        Category::Agriculture,
        Category::Business,
        Category::Education,
        Category::Entertainment,
        Category::Art,
        Category::Investment,
        Category::Weather,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Agriculture => "Agriculture",
            Category::Business => "Business",
            Category::Education => "Education",
            Category::Entertainment => "Entertainment",
            Category::Art => "Art",
            Category::Investment => "Investment",
            Category::Weather => "Weather",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0} is not a supported category")]
pub struct UnknownCategory(pub String);

impl FromStr for Category {
    type Err = UnknownCategory;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Category::ALL
            .iter()
            .copied()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| UnknownCategory(s.to_string()))
    }
}

/// A stored user, including the password hash. Never serialized to clients;
/// use [`PublicUser`] for that.
#[derive(Debug, Clone)]
pub struct User {
    pub id: String,
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub avatar: Option<String>,
    pub post_count: i64,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicUser {
    pub id: String,
    pub name: String,
    pub email: String,
    pub avatar: Option<String>,
    pub post_count: i64,
    pub created_at: String,
    pub updated_at: String,
}

impl From<User> for PublicUser {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            name: user.name,
            email: user.email,
            avatar: user.avatar,
            post_count: user.post_count,
            created_at: user.created_at,
            updated_at: user.updated_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Post {
    pub id: String,
    pub title: String,
    pub category: Category,
    pub description: String,
    pub creator: String,
    pub thumbnail: String,
    pub created_at: String,
    pub updated_at: String,
}
