use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;
use url::Url;

const DEFAULT_SSH_USER: &str = "git";

/// Transport used by a git remote URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RemoteProtocol {
    Https,
    Ssh,
    Git,
}

impl RemoteProtocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            RemoteProtocol::Https => "https",
            RemoteProtocol::Ssh => "ssh",
            RemoteProtocol::Git => "git",
        }
    }
}

impl fmt::Display for RemoteProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RemoteProtocol {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "https" | "http" => Ok(RemoteProtocol::Https),
            "ssh" => Ok(RemoteProtocol::Ssh),
            "git" => Ok(RemoteProtocol::Git),
            other => Err(format!(
                "unsupported remote protocol '{}'; expected https, ssh or git",
                other
            )),
        }
    }
}

/// Parsed form of a hosted repository remote such as `git@github.com:acme/app.git`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteUrl {
    pub protocol: RemoteProtocol,
    pub user: Option<String>,
    pub host: String,
    pub port: Option<u16>,
    pub owner: String,
    pub repository: String,
}

fn scp_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^(?:(?P<user>[^@/:]+)@)?(?P<host>[^:/]+):(?P<path>[^/].*)$")
            .expect("scp remote pattern is valid")
    })
}

impl RemoteUrl {
    /// Parse https, http, ssh://, git:// and scp-style remote URLs.
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        if raw.is_empty() {
            return None;
        }
        if raw.contains("://") {
            return Self::parse_url(raw);
        }
        let captures = scp_pattern().captures(raw)?;
        let (owner, repository) = split_path(captures.name("path")?.as_str())?;
        Some(Self {
            protocol: RemoteProtocol::Ssh,
            user: captures.name("user").map(|m| m.as_str().to_string()),
            host: captures.name("host")?.as_str().to_string(),
            port: None,
            owner,
            repository,
        })
    }

    fn parse_url(raw: &str) -> Option<Self> {
        let url = Url::parse(raw).ok()?;
        let protocol = match url.scheme() {
            "https" | "http" => RemoteProtocol::Https,
            "ssh" | "git+ssh" => RemoteProtocol::Ssh,
            "git" => RemoteProtocol::Git,
            _ => return None,
        };
        let host = url.host_str()?.to_string();
        let (owner, repository) = split_path(url.path())?;
        let user = match url.username() {
            "" => None,
            name if protocol == RemoteProtocol::Ssh => Some(name.to_string()),
            _ => None,
        };
        Some(Self {
            protocol,
            user,
            host,
            port: url.port(),
            owner,
            repository,
        })
    }

    /// Render the remote in the requested protocol. Ports only survive when the protocol is unchanged.
    pub fn render(&self, protocol: RemoteProtocol) -> String {
        let port = if protocol == self.protocol {
            self.port
        } else {
            None
        };
        let host = self.host.to_lowercase();
        match protocol {
            RemoteProtocol::Https => match port {
                Some(port) => format!(
                    "https://{}:{}/{}/{}.git",
                    host, port, self.owner, self.repository
                ),
                None => format!("https://{}/{}/{}.git", host, self.owner, self.repository),
            },
            RemoteProtocol::Ssh => {
                let user = self.user.as_deref().unwrap_or(DEFAULT_SSH_USER);
                match port {
                    Some(port) => format!(
                        "ssh://{}@{}:{}/{}/{}.git",
                        user, host, port, self.owner, self.repository
                    ),
                    None => format!("{}@{}:{}/{}.git", user, host, self.owner, self.repository),
                }
            }
            RemoteProtocol::Git => format!("git://{}/{}/{}.git", host, self.owner, self.repository),
        }
    }

    /// Canonical spelling of this remote in its current protocol.
    pub fn canonical(&self) -> String {
        self.render(self.protocol)
    }

    pub fn owner_matches(&self, owner: &str) -> bool {
        self.owner.eq_ignore_ascii_case(owner.trim())
    }
}

fn split_path(path: &str) -> Option<(String, String)> {
    let trimmed = path.trim().trim_matches('/');
    let trimmed = trimmed.strip_suffix(".git").unwrap_or(trimmed);
    let trimmed = trimmed.trim_end_matches('/');
    let (owner, repository) = trimmed.rsplit_once('/')?;
    if owner.is_empty() || repository.is_empty() {
        return None;
    }
    Some((owner.to_string(), repository.to_string()))
}
