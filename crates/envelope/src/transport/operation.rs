//! Console operation catalogue.

use common::EnvelopeLocation;
use hyper::Method;

/// A single backend call: where it goes and how its response is unwrapped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Operation {
    name: &'static str,
    method: Method,
    path: String,
    requires_auth: bool,
    envelope: EnvelopeLocation,
}

impl Operation {
    /// A call to `path` that requires a session and reads its envelope from
    /// `data`. Adjust with [`Operation::public`] and [`Operation::envelope_at`].
    pub fn new(name: &'static str, method: Method, path: impl Into<String>) -> Self {
        Self {
            name,
            method,
            path: path.into(),
            requires_auth: true,
            envelope: EnvelopeLocation::default(),
        }
    }

    /// Mark the call as not requiring a session token.
    pub fn public(mut self) -> Self {
        self.requires_auth = false;
        self
    }

    /// Read the response envelope from `location`.
    pub fn envelope_at(mut self, location: EnvelopeLocation) -> Self {
        self.envelope = location;
        self
    }

    /// Short name used in logs.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// HTTP method.
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Path relative to the backend base URL, starting with `/`.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Whether the session token must be attached.
    pub fn requires_auth(&self) -> bool {
        self.requires_auth
    }

    /// Where the response carries its envelope.
    pub fn envelope(&self) -> EnvelopeLocation {
        self.envelope
    }

    /// Whether the request carries a sealed `{ "body": ... }`.
    ///
    /// GET, HEAD and DELETE requests never do.
    pub fn carries_body(&self) -> bool {
        !matches!(self.method, Method::GET | Method::HEAD | Method::DELETE)
    }
}

/// Every operation the training console performs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleOperation {
    AdminLogin,
    TrainerLogin,
    Logout,
    ListTrainers,
    CreateTrainer,
    UpdateTrainer { id: String },
    DeleteTrainer { id: String },
    GetProfile,
    UpdateProfile,
    ListBatches,
    MyBatches,
    CreateBatch,
    UpdateBatch { id: String },
    DeleteBatch { id: String },
    CreateTopic,
    UpdateTopic { id: String },
    MyTopics,
    BatchTopics { batch_id: String },
}

impl ConsoleOperation {
    /// Build the concrete [`Operation`] for this call.
    pub fn operation(&self) -> Operation {
        use ConsoleOperation::*;
        use EnvelopeLocation::TopLevel;

        match self {
            AdminLogin => Operation::new("admin_login", Method::POST, "/adlogin").public(),
            TrainerLogin => {
                Operation::new("trainer_login", Method::POST, "/trainer/login").public()
            }
            Logout => Operation::new("logout", Method::POST, "/logout"),
            ListTrainers => Operation::new("list_trainers", Method::GET, "/trainers"),
            CreateTrainer => {
                Operation::new("create_trainer", Method::POST, "/trainers").envelope_at(TopLevel)
            }
            UpdateTrainer { id } => Operation::new(
                "update_trainer",
                Method::PUT,
                format!("/trainers/{}", encode_segment(id)),
            ),
            DeleteTrainer { id } => Operation::new(
                "delete_trainer",
                Method::DELETE,
                format!("/trainers/{}", encode_segment(id)),
            ),
            GetProfile => Operation::new("get_profile", Method::GET, "/profile"),
            UpdateProfile => Operation::new("update_profile", Method::PUT, "/profile"),
            ListBatches => {
                Operation::new("list_batches", Method::GET, "/batches").envelope_at(TopLevel)
            }
            MyBatches => Operation::new("my_batches", Method::GET, "/batches/trainer/my-batches"),
            CreateBatch => Operation::new("create_batch", Method::POST, "/api/v1/batches"),
            UpdateBatch { id } => Operation::new(
                "update_batch",
                Method::PUT,
                format!("/api/v1/batches/{}", encode_segment(id)),
            ),
            DeleteBatch { id } => Operation::new(
                "delete_batch",
                Method::DELETE,
                format!("/api/v1/batches/{}", encode_segment(id)),
            ),
            CreateTopic => Operation::new("create_topic", Method::POST, "/topics"),
            UpdateTopic { id } => Operation::new(
                "update_topic",
                Method::PUT,
                format!("/topics/{}", encode_segment(id)),
            ),
            MyTopics => Operation::new("my_topics", Method::GET, "/topics/trainer/my-topics"),
            BatchTopics { batch_id } => Operation::new(
                "batch_topics",
                Method::GET,
                format!("/topics/batch/{}", encode_segment(batch_id)),
            ),
        }
    }
}

impl From<ConsoleOperation> for Operation {
    fn from(op: ConsoleOperation) -> Self {
        op.operation()
    }
}

impl From<&ConsoleOperation> for Operation {
    fn from(op: &ConsoleOperation) -> Self {
        op.operation()
    }
}

/// Percent-encode a single path segment (RFC 3986 unreserved set kept).
fn encode_segment(segment: &str) -> String {
    let mut out = String::with_capacity(segment.len());
    for b in segment.bytes() {
        if b.is_ascii_alphanumeric() || matches!(b, b'-' | b'.' | b'_' | b'~') {
            out.push(b as char);
        } else {
            out.push_str(&format!("%{b:02X}"));
        }
    }
    out
}
