use serde::Serialize;

/// Operation an endpoint is about to perform.
///
/// Passed alongside rules for logging; rules do not interpret it.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize)]
pub enum OperationKind {
    Create,
    Read,
    Update,
    Delete,
    List,
    UpdateProfile,
}

impl OperationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::Create => "Create",
            OperationKind::Read => "Read",
            OperationKind::Update => "Update",
            OperationKind::Delete => "Delete",
            OperationKind::List => "List",
            OperationKind::UpdateProfile => "UpdateProfile",
        }
    }
}

impl core::fmt::Display for OperationKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}
