use cmdline_contract::ExecOutput;

use crate::value::TypedValue;

/// Result of executing a requisition.
#[derive(Debug, Clone, PartialEq)]
pub struct Output {
    /// Executed command, absent when nothing matched.
    pub command_name: Option<String>,
    /// Text that was executed.
    pub typed: String,
    /// Returned value, or the error payload.
    pub data: TypedValue,
    /// Type name used to pick a converter.
    pub type_name: String,
    /// Whether `data` describes a failure.
    pub is_error: bool,
}

impl Output {
    pub(crate) fn error(command_name: Option<String>, typed: String, message: impl Into<String>) -> Self {
        Self {
            command_name,
            typed,
            data: TypedValue::String(message.into()),
            type_name: "error".to_string(),
            is_error: true,
        }
    }

    /// Wire form.
    pub fn to_json(&self) -> ExecOutput {
        ExecOutput {
            data: self.data.to_json(),
            type_name: self.type_name.clone(),
            is_error: self.is_error,
        }
    }
}
