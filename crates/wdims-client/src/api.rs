use async_trait::async_trait;
use reqwest::{Response, StatusCode};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;
use wdims_core::{DisplaySettings, EngineConfig, ErrorKind, Profile};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClientError {
    #[error("server returned {status}: {message}")]
    Server {
        status: u16,
        kind: Option<ErrorKind>,
        message: String,
    },
    #[error("transport error: {0}")]
    Transport(String),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("{message}")]
    Rejected { kind: ErrorKind, message: String },
    /// An `error` event pushed by the hub.
    #[error("hub error: {message}")]
    Hub {
        kind: Option<ErrorKind>,
        message: String,
    },
}

impl ClientError {
    pub fn rejected(kind: ErrorKind, message: impl Into<String>) -> Self {
        ClientError::Rejected {
            kind,
            message: message.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            ClientError::Server { kind: Some(kind), .. } => *kind,
            ClientError::Server { status, .. } => match *status {
                400 => ErrorKind::InvalidName,
                403 => ErrorKind::Forbidden,
                404 => ErrorKind::NotFound,
                409 => ErrorKind::AlreadyExists,
                _ => ErrorKind::Io,
            },
            ClientError::Transport(_) => ErrorKind::Transport,
            ClientError::Decode(_) => ErrorKind::Parse,
            ClientError::Rejected { kind, .. } => *kind,
            ClientError::Hub { kind, .. } => kind.unwrap_or(ErrorKind::Io),
        }
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            ClientError::Decode(err.to_string())
        } else {
            ClientError::Transport(err.to_string())
        }
    }
}

/// Request surface of the profile service.
#[async_trait]
pub trait ProfileApi: Send + Sync {
    async fn list_profiles(&self) -> Result<Vec<String>, ClientError>;
    async fn get_profile(&self, name: &str) -> Result<Profile, ClientError>;
    async fn create_profile(&self, name: &str, copy_from: Option<&str>) -> Result<(), ClientError>;
    async fn update_display_settings(
        &self,
        name: &str,
        settings: &DisplaySettings,
    ) -> Result<(), ClientError>;
    async fn update_engine_config(&self, name: &str, config: &EngineConfig)
        -> Result<(), ClientError>;
    async fn delete_profile(&self, name: &str) -> Result<(), ClientError>;
    async fn clone_profile(&self, source: &str, new_name: &str) -> Result<(), ClientError>;
    async fn rename_profile(&self, old: &str, new: &str) -> Result<(), ClientError>;
    async fn get_active_profile(&self) -> Result<String, ClientError>;
    async fn set_active_profile(&self, name: &str) -> Result<(), ClientError>;
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: String,
    #[serde(default)]
    kind: Option<ErrorKind>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateProfileBody<'a> {
    name: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    copy_from: Option<&'a str>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct NewNameBody<'a> {
    new_name: &'a str,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ActiveProfileBody {
    profile_name: String,
}

/// `ProfileApi` over the hub's HTTP routes.
#[derive(Clone, Debug)]
pub struct HttpProfileApi {
    client: reqwest::Client,
    base: Url,
}

impl HttpProfileApi {
    pub fn new(base: Url) -> Self {
        Self {
            client: reqwest::Client::new(),
            base,
        }
    }

    pub fn with_client(client: reqwest::Client, base: Url) -> Self {
        Self { client, base }
    }

    /// Builds `<base>/api/profiles/<segments..>`, percent-encoding each segment.
    fn endpoint(&self, segments: &[&str]) -> Result<Url, ClientError> {
        let mut url = self.base.clone();
        {
            let mut path = url
                .path_segments_mut()
                .map_err(|_| ClientError::Transport(format!("invalid base url {}", self.base)))?;
            path.pop_if_empty().extend(["api", "profiles"]).extend(segments);
        }
        Ok(url)
    }
}

async fn check(response: Response) -> Result<Response, ClientError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let text = response.text().await.unwrap_or_default();
    Err(server_error(status, &text))
}

fn server_error(status: StatusCode, text: &str) -> ClientError {
    match serde_json::from_str::<ErrorBody>(text) {
        Ok(body) => ClientError::Server {
            status: status.as_u16(),
            kind: body.kind,
            message: body.error,
        },
        Err(_) => ClientError::Server {
            status: status.as_u16(),
            kind: None,
            message: if text.is_empty() {
                status.to_string()
            } else {
                text.to_string()
            },
        },
    }
}

#[async_trait]
impl ProfileApi for HttpProfileApi {
    async fn list_profiles(&self) -> Result<Vec<String>, ClientError> {
        let response = self.client.get(self.endpoint(&[])?).send().await?;
        Ok(check(response).await?.json().await?)
    }

    async fn get_profile(&self, name: &str) -> Result<Profile, ClientError> {
        let response = self.client.get(self.endpoint(&[name])?).send().await?;
        Ok(check(response).await?.json().await?)
    }

    async fn create_profile(&self, name: &str, copy_from: Option<&str>) -> Result<(), ClientError> {
        let response = self
            .client
            .post(self.endpoint(&[])?)
            .json(&CreateProfileBody { name, copy_from })
            .send()
            .await?;
        check(response).await?;
        Ok(())
    }

    async fn update_display_settings(
        &self,
        name: &str,
        settings: &DisplaySettings,
    ) -> Result<(), ClientError> {
        let response = self
            .client
            .put(self.endpoint(&[name, "display-settings"])?)
            .json(settings)
            .send()
            .await?;
        check(response).await?;
        Ok(())
    }

    async fn update_engine_config(
        &self,
        name: &str,
        config: &EngineConfig,
    ) -> Result<(), ClientError> {
        let response = self
            .client
            .put(self.endpoint(&[name, "search-engines"])?)
            .json(config)
            .send()
            .await?;
        check(response).await?;
        Ok(())
    }

    async fn delete_profile(&self, name: &str) -> Result<(), ClientError> {
        let response = self.client.delete(self.endpoint(&[name])?).send().await?;
        check(response).await?;
        Ok(())
    }

    async fn clone_profile(&self, source: &str, new_name: &str) -> Result<(), ClientError> {
        let response = self
            .client
            .post(self.endpoint(&[source, "clone"])?)
            .json(&NewNameBody { new_name })
            .send()
            .await?;
        check(response).await?;
        Ok(())
    }

    async fn rename_profile(&self, old: &str, new: &str) -> Result<(), ClientError> {
        let response = self
            .client
            .put(self.endpoint(&[old, "rename"])?)
            .json(&NewNameBody { new_name: new })
            .send()
            .await?;
        check(response).await?;
        Ok(())
    }

    async fn get_active_profile(&self) -> Result<String, ClientError> {
        let response = self
            .client
            .get(self.endpoint(&["active", "current"])?)
            .send()
            .await?;
        let body: ActiveProfileBody = check(response).await?.json().await?;
        Ok(body.profile_name)
    }

    async fn set_active_profile(&self, name: &str) -> Result<(), ClientError> {
        let response = self
            .client
            .put(self.endpoint(&["active", "current"])?)
            .json(&ActiveProfileBody {
                profile_name: name.to_string(),
            })
            .send()
            .await?;
        check(response).await?;
        Ok(())
    }
}
