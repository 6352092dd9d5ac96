//! Shared command-line contracts used by the interpreter engine, the remote bridge, and thin
//! input clients.
//!
//! This crate is intentionally runtime-agnostic. It defines serializable command metadata,
//! conversion status, requisition state snapshots, execution output, and the request/response
//! frames of the remote protocol without depending on the engine or any transport.

#![warn(missing_docs, rustdoc::broken_intra_doc_links)]

use std::{collections::BTreeMap, fmt};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Conversion status of an argument, an assignment, or a whole requisition.
///
/// Variants are ordered by severity so the combined status of several parts is their maximum.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Status {
    /// Usable as-is.
    #[default]
    Valid,
    /// Not yet wrong, not yet usable.
    Incomplete,
    /// Cannot become valid without correction.
    Error,
}

impl Status {
    /// Returns the more severe of two statuses.
    pub fn combine(self, other: Status) -> Status {
        self.max(other)
    }

    /// Combines any number of statuses, `Valid` when empty.
    pub fn combine_all(statuses: impl IntoIterator<Item = Status>) -> Status {
        statuses.into_iter().fold(Status::Valid, Status::combine)
    }

    /// Returns the wire spelling.
    pub fn as_str(self) -> &'static str {
        match self {
            Status::Valid => "VALID",
            Status::Incomplete => "INCOMPLETE",
            Status::Error => "ERROR",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a command's executor runs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RunAt {
    /// The command runs next to the input widget.
    Client,
    /// The command runs where the target lives.
    #[default]
    Server,
}

/// A type reference: either a registered type name or an inline, parameterized spec.
///
/// Serializes as `"number"` or as `{ "name": "selection", "data": [...] }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TypeSpec {
    /// A registered type name.
    Name(String),
    /// A parameterized type.
    Inline {
        /// Type factory name.
        name: String,
        /// Factory options.
        #[serde(flatten)]
        options: Map<String, Value>,
    },
}

impl TypeSpec {
    /// Reference to a registered type by name.
    pub fn named(name: impl Into<String>) -> Self {
        Self::Name(name.into())
    }

    /// Parameterized type; `options` must be a JSON object, other values are ignored.
    pub fn inline(name: impl Into<String>, options: Value) -> Self {
        let options = match options {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        Self::Inline {
            name: name.into(),
            options,
        }
    }

    /// Static selection over `data`, in declared order.
    pub fn selection<I, S>(data: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let data = data
            .into_iter()
            .map(|entry| Value::String(entry.into()))
            .collect::<Vec<_>>();
        Self::inline("selection", serde_json::json!({ "data": data }))
    }

    /// Array whose members are of `sub_type`.
    pub fn array(sub_type: TypeSpec) -> Self {
        Self::inline("array", serde_json::json!({ "subtype": sub_type }))
    }

    /// Type whose behavior lives on the other side of the bridge.
    pub fn remote(command_name: impl Into<String>, param_name: impl Into<String>) -> Self {
        Self::inline(
            "remote",
            serde_json::json!({
                "commandName": command_name.into(),
                "paramName": param_name.into(),
            }),
        )
    }

    /// Factory or registered type name.
    pub fn name(&self) -> &str {
        match self {
            Self::Name(name) => name,
            Self::Inline { name, .. } => name,
        }
    }

    /// Factory options, empty for plain names.
    pub fn options(&self) -> Map<String, Value> {
        match self {
            Self::Name(_) => Map::new(),
            Self::Inline { options, .. } => options.clone(),
        }
    }
}

impl From<&str> for TypeSpec {
    fn from(name: &str) -> Self {
        Self::named(name)
    }
}

/// Serialized parameter metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParamDescriptor {
    /// Parameter name, unique within its command.
    pub name: String,
    /// Parameter type.
    #[serde(rename = "type")]
    pub type_spec: TypeSpec,
    /// Short description.
    pub description: String,
    /// Optional longer manual text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manual: Option<String>,
    /// JSON projection of the default value, when one is declared.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_value: Option<Value>,
    /// Whether the parameter must be supplied.
    #[serde(default)]
    pub required: bool,
    /// UI clustering group; grouped parameters are named-only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_name: Option<String>,
    /// Omitted from hints and option markers.
    #[serde(default)]
    pub hidden: bool,
}

/// Serialized command metadata. Executors and live references never appear here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandDescriptor {
    /// Space-separated command name such as `addon enable`.
    pub name: String,
    /// Short description.
    pub description: String,
    /// Optional longer manual text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manual: Option<String>,
    /// Ordered parameters, group members flattened in declaration order.
    #[serde(default)]
    pub params: Vec<ParamDescriptor>,
    /// Declared return type name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub return_type: Option<String>,
    /// Execution locality.
    #[serde(default)]
    pub run_at: RunAt,
    /// Callable but omitted from listings and predictions.
    #[serde(default)]
    pub hidden: bool,
    /// Parent commands only group sub-commands and cannot execute.
    #[serde(default)]
    pub is_parent: bool,
    /// Custom properties requested by the caller, such as `buttonId`.
    #[serde(flatten)]
    pub custom: BTreeMap<String, Value>,
}

/// Cursor selection inside the typed text, in bytes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CursorRange {
    /// Selection start.
    pub start: usize,
    /// Selection end.
    pub end: usize,
}

/// One run of typed text sharing a status, used to underline input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusSpan {
    /// Text covered by this span.
    pub string: String,
    /// Status of the covered text.
    pub status: Status,
}

/// One prediction offered to the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PredictionItem {
    /// Text inserted on completion.
    pub name: String,
    /// Optional short description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Whether completing with this prediction still leaves the argument incomplete.
    #[serde(default)]
    pub incomplete: bool,
}

/// Snapshot of a requisition as seen from a cursor position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateData {
    /// The full typed text.
    pub typed: String,
    /// Cursor the snapshot was computed for.
    pub cursor: CursorRange,
    /// Overall requisition status.
    pub status: Status,
    /// Typed text split into status runs.
    pub status_markup: Vec<StatusSpan>,
    /// Suffix to append when the current text is a prefix of the ranked prediction.
    pub direct_tab_text: String,
    /// Replacement hint shown as an arrow when the prediction is not a strict completion.
    pub arrow_tab_text: String,
    /// Hints for parameters still to fill in, such as `<name>` or `[options]`.
    pub empty_parameters: Vec<String>,
    /// Message for the assignment under the cursor, or the overall status message.
    pub message: String,
    /// Predictions for the assignment under the cursor.
    pub predictions: Vec<PredictionItem>,
    /// Name of the parameter under the cursor, absent when the cursor is on the command.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_param: Option<String>,
}

/// Reply to a single-parameter validation request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParseTypeReply {
    /// Parameter status.
    pub status: Status,
    /// Message to display.
    pub message: String,
    /// Suggested values for the parameter.
    pub predictions: Vec<String>,
}

/// Result of executing a command, in transport-safe form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecOutput {
    /// Command output after conversion.
    pub data: Value,
    /// Type name of `data`, used to pick a converter on the receiving side.
    #[serde(rename = "type")]
    pub type_name: String,
    /// Whether the output describes a failure.
    #[serde(rename = "isError")]
    pub is_error: bool,
}

/// One entry of a selection lookup with its non-serializable value stripped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectionLookupItem {
    /// Entry name as typed by the user.
    pub name: String,
}

/// Monotonic identifier of one bridge request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RequestId(pub u64);

/// Operations exposed by the remote bridge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "camelCase")]
pub enum BridgeOp {
    /// List the remotely executable commands.
    #[serde(rename_all = "camelCase")]
    Specs {
        /// Extra command properties to include.
        custom_props: Option<Vec<String>>,
    },
    /// Update then execute.
    Execute {
        /// Command text.
        typed: String,
    },
    /// Update then snapshot the state at a cursor.
    State {
        /// Command text.
        typed: String,
        /// Cursor start position.
        start: usize,
        /// Number of times the user cycled predictions.
        rank: i64,
    },
    /// Update then report one parameter's status.
    ParseType {
        /// Command text.
        typed: String,
        /// Parameter name.
        param: String,
    },
    /// Update then step one parameter's value up.
    IncrementType {
        /// Command text.
        typed: String,
        /// Parameter name.
        param: String,
    },
    /// Update then step one parameter's value down.
    DecrementType {
        /// Command text.
        typed: String,
        /// Parameter name.
        param: String,
    },
    /// Names allowed by a selection parameter.
    #[serde(rename_all = "camelCase")]
    GetSelectionLookup {
        /// Command owning the parameter.
        command_name: String,
        /// Parameter name.
        param_name: String,
    },
    /// Raw dataset behind a selection parameter.
    #[serde(rename_all = "camelCase")]
    GetSelectionData {
        /// Command owning the parameter.
        command_name: String,
        /// Parameter name.
        param_name: String,
    },
}

impl BridgeOp {
    /// Wire name of the operation.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Specs { .. } => "specs",
            Self::Execute { .. } => "execute",
            Self::State { .. } => "state",
            Self::ParseType { .. } => "parseType",
            Self::IncrementType { .. } => "incrementType",
            Self::DecrementType { .. } => "decrementType",
            Self::GetSelectionLookup { .. } => "getSelectionLookup",
            Self::GetSelectionData { .. } => "getSelectionData",
        }
    }
}

/// Successful replies, one variant per [`BridgeOp`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", content = "value", rename_all = "camelCase")]
pub enum BridgeReply {
    /// Command specs snapshot.
    Specs(Vec<CommandDescriptor>),
    /// Execution output.
    Execute(ExecOutput),
    /// Requisition state.
    State(StateData),
    /// Parameter status.
    ParseType(ParseTypeReply),
    /// New argument text, absent when no change is possible.
    IncrementType(Option<String>),
    /// New argument text, absent when no change is possible.
    DecrementType(Option<String>),
    /// Selection names.
    SelectionLookup(Vec<SelectionLookupItem>),
    /// Raw selection dataset.
    SelectionData(Value),
}

/// Notifications pushed from server to client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum BridgeEvent {
    /// The server registry mutated; cached specs are stale.
    CommandsChanged,
}

/// Protocol fault classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BridgeFaultCode {
    /// The named command is not registered.
    NoSuchCommand,
    /// The named parameter does not exist on the command.
    NoSuchParameter,
    /// The transport or the remote requisition is gone.
    Disconnected,
    /// A frame could not be decoded or did not match the request.
    Protocol,
}

/// Hard failure surfaced to the remote caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BridgeFault {
    /// Fault category.
    pub code: BridgeFaultCode,
    /// Human-readable message.
    pub message: String,
}

impl BridgeFault {
    /// Creates a new fault.
    pub fn new(code: BridgeFaultCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for BridgeFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.code, self.message)
    }
}

/// One message on the bridge transport.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum BridgeFrame {
    /// Client to server call.
    Request {
        /// Request identifier echoed by the reply.
        id: RequestId,
        /// Requested operation.
        call: BridgeOp,
    },
    /// Server to client success.
    Reply {
        /// Identifier of the answered request.
        id: RequestId,
        /// Operation result.
        reply: BridgeReply,
    },
    /// Server to client failure.
    Fault {
        /// Identifier of the failed request.
        id: RequestId,
        /// Failure details.
        fault: BridgeFault,
    },
    /// Server to client notification.
    Event {
        /// Notification payload.
        event: BridgeEvent,
    },
}

impl BridgeFrame {
    /// Encodes the frame as JSON text.
    ///
    /// # Errors
    ///
    /// Returns an error when a payload cannot be represented as JSON.
    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Decodes a frame from JSON text.
    ///
    /// # Errors
    ///
    /// Returns an error for malformed or unknown frames.
    pub fn decode(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn status_combines_by_severity() {
        assert_eq!(Status::Valid.combine(Status::Incomplete), Status::Incomplete);
        assert_eq!(Status::Error.combine(Status::Incomplete), Status::Error);
        assert_eq!(Status::combine_all([]), Status::Valid);
        assert_eq!(serde_json::to_value(Status::Incomplete).unwrap(), json!("INCOMPLETE"));
    }

    #[test]
    fn type_spec_accepts_names_and_inline_specs() {
        let named: TypeSpec = serde_json::from_value(json!("number")).expect("named");
        assert_eq!(named, TypeSpec::named("number"));

        let inline: TypeSpec =
            serde_json::from_value(json!({ "name": "number", "min": 1 })).expect("inline");
        assert_eq!(inline.name(), "number");
        assert_eq!(inline.options().get("min"), Some(&json!(1)));

        let selection = TypeSpec::selection(["extension", "theme"]);
        assert_eq!(
            serde_json::to_value(&selection).unwrap(),
            json!({ "name": "selection", "data": ["extension", "theme"] })
        );
    }

    #[test]
    fn command_descriptor_flattens_custom_properties() {
        let mut custom = BTreeMap::new();
        custom.insert("buttonId".to_string(), json!("command-button-screenshot"));
        let descriptor = CommandDescriptor {
            name: "screenshot".to_string(),
            description: "Save an image of the page".to_string(),
            manual: None,
            params: Vec::new(),
            return_type: None,
            run_at: RunAt::Client,
            hidden: false,
            is_parent: false,
            custom,
        };
        let value = serde_json::to_value(&descriptor).unwrap();
        assert_eq!(value["buttonId"], json!("command-button-screenshot"));
        assert_eq!(value["runAt"], json!("client"));
        let back: CommandDescriptor = serde_json::from_value(value).unwrap();
        assert_eq!(back, descriptor);
    }

    #[test]
    fn exec_output_uses_wire_field_names() {
        let output = ExecOutput {
            data: json!("done"),
            type_name: "string".to_string(),
            is_error: false,
        };
        assert_eq!(
            serde_json::to_value(&output).unwrap(),
            json!({ "data": "done", "type": "string", "isError": false })
        );
    }

    #[test]
    fn frames_survive_json_encoding() {
        let request = BridgeFrame::Request {
            id: RequestId(7),
            call: BridgeOp::State {
                typed: "addon enable ".to_string(),
                start: 13,
                rank: -1,
            },
        };
        let text = request.encode().expect("encode");
        assert!(text.contains("\"op\":\"state\""));
        assert_eq!(BridgeFrame::decode(&text).expect("decode"), request);

        let reply = BridgeFrame::Reply {
            id: RequestId(7),
            reply: BridgeReply::IncrementType(None),
        };
        assert_eq!(BridgeFrame::decode(&reply.encode().unwrap()).unwrap(), reply);

        let event = BridgeFrame::Event {
            event: BridgeEvent::CommandsChanged,
        };
        assert_eq!(
            serde_json::to_value(&event).unwrap(),
            json!({ "kind": "event", "event": { "type": "commands-changed" } })
        );
    }

    #[test]
    fn lookup_op_uses_camel_case_fields() {
        let op = BridgeOp::GetSelectionLookup {
            command_name: "addon enable".to_string(),
            param_name: "name".to_string(),
        };
        assert_eq!(
            serde_json::to_value(&op).unwrap(),
            json!({ "op": "getSelectionLookup", "commandName": "addon enable", "paramName": "name" })
        );
        assert_eq!(op.name(), "getSelectionLookup");
    }
}
