use serde::{Deserialize, Serialize};

/// One review comment, ordered as returned by the forge.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrComment {
    pub author: String,
    pub body: String,
    /// File the comment is anchored to, when it is a line comment.
    #[serde(default)]
    pub path: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PullRequest {
    pub number: u64,
    pub title: String,
    pub url: String,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub comments: Vec<PrComment>,
}

impl PullRequest {
    pub fn comment(&self, index: usize) -> Option<&PrComment> {
        self.comments.get(index)
    }
}
