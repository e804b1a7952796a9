//! Trello REST adapter.
//!
//! Implements [`TrackerClient`] on top of the Trello v1 REST API. Cards map
//! to items, lists map to item states, and `commentCard` actions map to
//! comments.

use super::{Attachment, Comment, RawItem, TrackerClient, TrackerError, TrackerResult};
use async_trait::async_trait;
use regex::Regex;
use reqwest::header::AUTHORIZATION;
use reqwest::multipart::{Form, Part};
use reqwest::{RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::OnceLock;
use std::time::Duration;
use tracing::debug;

/// Trello API endpoint
const TRELLO_API_URL: &str = "https://api.trello.com/1";

/// API key + token pair issued by Trello.
#[derive(Clone)]
pub struct TrelloCredentials {
    pub api_key: String,
    pub token: String,
}

impl TrelloCredentials {
    pub fn new(api_key: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            token: token.into(),
        }
    }
}

impl std::fmt::Debug for TrelloCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrelloCredentials")
            .field("api_key", &"<redacted>")
            .field("token", &"<redacted>")
            .finish()
    }
}

/// Extract a board id from a board URL (`https://trello.com/b/<id>/<slug>`)
/// or accept a bare alphanumeric id.
#[must_use]
pub fn parse_board_id(board: &str) -> Option<String> {
    static BOARD_URL: OnceLock<Regex> = OnceLock::new();
    static BOARD_ID: OnceLock<Regex> = OnceLock::new();

    let board = board.trim();
    let url = BOARD_URL.get_or_init(|| {
        Regex::new(r"^https?://trello\.com/b/([a-zA-Z0-9]+)(?:/[^/?#]+)*/?$").expect("valid regex")
    });
    if let Some(caps) = url.captures(board) {
        return Some(caps[1].to_string());
    }

    let id = BOARD_ID.get_or_init(|| Regex::new(r"^[a-zA-Z0-9]+$").expect("valid regex"));
    id.is_match(board).then(|| board.to_string())
}

/// Trello client.
#[derive(Debug, Clone)]
pub struct TrelloClient {
    client: reqwest::Client,
    api_url: String,
    credentials: TrelloCredentials,
}

// Wire shapes. Only the fields the engine reads are declared.

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CardJson {
    id: String,
    name: String,
    #[serde(default)]
    url: String,
    id_list: String,
    #[serde(default)]
    id_members: Vec<String>,
    #[serde(default)]
    desc: String,
    #[serde(default)]
    labels: Vec<LabelJson>,
}

#[derive(Debug, Deserialize)]
struct LabelJson {
    #[serde(default)]
    name: String,
}

#[derive(Debug, Deserialize)]
struct ListJson {
    id: String,
    name: String,
}

#[derive(Debug, Deserialize)]
struct ActionJson {
    id: String,
    #[serde(default)]
    data: ActionData,
}

#[derive(Debug, Default, Deserialize)]
struct ActionData {
    #[serde(default)]
    text: String,
    #[serde(default)]
    attachment: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AttachmentJson {
    id: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    file_name: Option<String>,
    #[serde(default)]
    url: String,
}

#[derive(Debug, Deserialize)]
struct MemberJson {
    id: String,
}

impl From<AttachmentJson> for Attachment {
    fn from(a: AttachmentJson) -> Self {
        // Uploaded files carry fileName; link attachments only have name.
        let name = a.file_name.filter(|n| !n.is_empty()).unwrap_or(a.name);
        Self {
            id: a.id,
            name,
            url: a.url,
        }
    }
}

impl From<ActionJson> for Comment {
    fn from(a: ActionJson) -> Self {
        Self {
            id: a.id,
            has_attachment_hint: a.data.attachment.is_some(),
            text: a.data.text,
        }
    }
}

impl TrelloClient {
    /// Create a new Trello client.
    ///
    /// # Errors
    /// Returns error if the HTTP client cannot be constructed
    pub fn new(credentials: TrelloCredentials) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(20))
            .timeout(Duration::from_secs(45))
            .build()?;

        Ok(Self {
            client,
            api_url: TRELLO_API_URL.to_string(),
            credentials,
        })
    }

    /// Point the client at another API root (self-hosted proxies, tests).
    #[must_use]
    pub fn with_api_url(mut self, api_url: impl Into<String>) -> Self {
        self.api_url = api_url.into().trim_end_matches('/').to_string();
        self
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.api_url, path)
    }

    fn auth_query(&self) -> [(&'static str, &str); 2] {
        [
            ("key", self.credentials.api_key.as_str()),
            ("token", self.credentials.token.as_str()),
        ]
    }

    fn oauth_header(&self) -> String {
        format!(
            "OAuth oauth_consumer_key=\"{}\", oauth_token=\"{}\"",
            self.credentials.api_key, self.credentials.token
        )
    }

    /// Send a request and turn transport failures and non-2xx statuses into
    /// [`TrackerError`].
    async fn send(&self, operation: &str, request: RequestBuilder) -> TrackerResult<Response> {
        let response = request
            .send()
            .await
            .map_err(|e| TrackerError::new(operation, e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(TrackerError::with_status(
            operation,
            status.as_u16(),
            body.trim().to_string(),
        ))
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        operation: &str,
        path: &str,
        query: &[(&str, &str)],
    ) -> TrackerResult<T> {
        debug!(operation, path, "Trello request");
        let request = self
            .client
            .get(self.url(path))
            .query(&self.auth_query())
            .query(query);
        let response = self.send(operation, request).await?;
        response
            .json()
            .await
            .map_err(|e| TrackerError::new(operation, format!("unexpected response body: {e}")))
    }

    async fn list_names(&self, board_id: &str) -> TrackerResult<HashMap<String, String>> {
        let lists: Vec<ListJson> = self
            .get_json(
                "list board lists",
                &format!("/boards/{board_id}/lists"),
                &[("fields", "id,name")],
            )
            .await?;
        Ok(lists.into_iter().map(|l| (l.id, l.name)).collect())
    }

    /// Cheap reachability probe: fetch the board's name.
    ///
    /// # Errors
    /// Returns the tracker failure when the board is unreachable
    pub async fn board_name(&self, board_id: &str) -> TrackerResult<String> {
        #[derive(Deserialize)]
        struct BoardJson {
            name: String,
        }
        let board: BoardJson = self
            .get_json("get board", &format!("/boards/{board_id}"), &[("fields", "name")])
            .await?;
        Ok(board.name)
    }
}

#[async_trait]
impl TrackerClient for TrelloClient {
    async fn list_items(&self, scope_id: &str) -> TrackerResult<Vec<RawItem>> {
        let cards: Vec<CardJson> = self
            .get_json(
                "list board cards",
                &format!("/boards/{scope_id}/cards"),
                &[("fields", "id,name,url,idList,idMembers,desc,labels")],
            )
            .await?;
        let names = self.list_names(scope_id).await?;

        Ok(cards
            .into_iter()
            .map(|c| RawItem {
                state_name: names.get(&c.id_list).cloned(),
                id: c.id,
                name: c.name,
                url: c.url,
                state_id: c.id_list,
                member_ids: c.id_members,
                description: c.desc,
                labels: c.labels.into_iter().map(|l| l.name).collect(),
            })
            .collect())
    }

    async fn comments(&self, item_id: &str) -> TrackerResult<Vec<Comment>> {
        let actions: Vec<ActionJson> = self
            .get_json(
                "list card comments",
                &format!("/cards/{item_id}/actions"),
                &[("filter", "commentCard")],
            )
            .await?;
        // Trello returns newest first.
        Ok(actions.into_iter().rev().map(Comment::from).collect())
    }

    async fn attachments(&self, item_id: &str) -> TrackerResult<Vec<Attachment>> {
        let attachments: Vec<AttachmentJson> = self
            .get_json(
                "list card attachments",
                &format!("/cards/{item_id}/attachments"),
                &[],
            )
            .await?;
        Ok(attachments.into_iter().map(Attachment::from).collect())
    }

    async fn upload_attachment(
        &self,
        item_id: &str,
        file_name: &str,
        bytes: Vec<u8>,
    ) -> TrackerResult<Attachment> {
        let operation = "upload attachment";
        let part = Part::bytes(bytes)
            .file_name(file_name.to_string())
            .mime_str("text/csv")
            .map_err(|e| TrackerError::new(operation, e.to_string()))?;
        let form = Form::new()
            .part("file", part)
            .text("name", file_name.to_string());

        let request = self
            .client
            .post(self.url(&format!("/cards/{item_id}/attachments")))
            .query(&self.auth_query())
            .multipart(form);
        let response = self.send(operation, request).await?;
        let attachment: AttachmentJson = response
            .json()
            .await
            .map_err(|e| TrackerError::new(operation, format!("unexpected response body: {e}")))?;
        Ok(attachment.into())
    }

    async fn post_comment(&self, item_id: &str, text: &str) -> TrackerResult<Comment> {
        let operation = "post comment";
        let request = self
            .client
            .post(self.url(&format!("/cards/{item_id}/actions/comments")))
            .query(&self.auth_query())
            .query(&[("text", text)]);
        let response = self.send(operation, request).await?;
        let action: ActionJson = response
            .json()
            .await
            .map_err(|e| TrackerError::new(operation, format!("unexpected response body: {e}")))?;
        Ok(action.into())
    }

    async fn delete_comment(&self, comment_id: &str) -> TrackerResult<()> {
        let request = self
            .client
            .delete(self.url(&format!("/actions/{comment_id}")))
            .query(&self.auth_query());
        self.send("delete comment", request).await?;
        Ok(())
    }

    async fn delete_attachment(&self, item_id: &str, attachment_id: &str) -> TrackerResult<()> {
        let request = self
            .client
            .delete(self.url(&format!("/cards/{item_id}/attachments/{attachment_id}")))
            .query(&self.auth_query());
        self.send("delete attachment", request).await?;
        Ok(())
    }

    async fn authenticated_user_id(&self) -> TrackerResult<String> {
        let me: MemberJson = self
            .get_json("get authenticated member", "/members/me", &[("fields", "id")])
            .await?;
        Ok(me.id)
    }

    async fn download_attachment(&self, attachment: &Attachment) -> TrackerResult<Vec<u8>> {
        // Attachment downloads reject key/token query params and want the
        // OAuth header instead.
        let request = self
            .client
            .get(&attachment.url)
            .header(AUTHORIZATION, self.oauth_header());
        let response = self.send("download attachment", request).await?;
        response
            .bytes()
            .await
            .map(|b| b.to_vec())
            .map_err(|e| TrackerError::new("download attachment", e.to_string()))
    }
}
