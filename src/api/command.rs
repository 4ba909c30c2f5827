/*!
 * Command Parsing
 * Decodes and validates JSON commands before they reach the registry
 */

use crate::core::errors::SupervisorError;
use crate::core::types::{Environment, InstanceId};
use crate::process::InstanceStatus;
use crate::supervisor::InstanceRegistry;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use thiserror::Error;

pub type CommandResult<T> = Result<T, CommandError>;

/// Rejections produced before a command is executed
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CommandError {
    #[error("Invalid JSON: {0}")]
    Json(String),

    #[error("Unknown command name: \"{0}\".")]
    UnknownCommand(String),

    #[error("A required parameter \"{0}\" is absent.")]
    MissingParameter(&'static str),

    #[error("Unknown parameter \"{0}\".")]
    UnknownParameter(String),

    #[error("Failed to parse command params: \"{0}\"")]
    InvalidParameter(String),
}

/// Requirements for one command parameter
struct ParamSpec {
    name: &'static str,
    required: bool,
    default: Option<fn() -> Value>,
}

fn default_true() -> Value {
    Value::Bool(true)
}

const START_PARAMS: &[ParamSpec] = &[
    ParamSpec {
        name: "name",
        required: true,
        default: None,
    },
    ParamSpec {
        name: "env",
        required: false,
        default: None,
    },
    ParamSpec {
        name: "restartable",
        required: false,
        default: Some(default_true),
    },
];

const STOP_PARAMS: &[ParamSpec] = &[
    ParamSpec {
        name: "id",
        required: true,
        default: None,
    },
    ParamSpec {
        name: "force",
        required: false,
        default: Some(default_true),
    },
];

const STATUS_PARAMS: &[ParamSpec] = &[ParamSpec {
    name: "id",
    required: true,
    default: None,
}];

fn param_specs(command_name: &str) -> Option<&'static [ParamSpec]> {
    match command_name {
        "start" => Some(START_PARAMS),
        "stop" => Some(STOP_PARAMS),
        "status" => Some(STATUS_PARAMS),
        "list" => Some(&[]),
        _ => None,
    }
}

/// Wire shape of a command
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct CommandJson {
    command_name: String,
    #[serde(default)]
    params: Option<Map<String, Value>>,
}

#[derive(Debug, Deserialize)]
struct StartParams {
    name: String,
    #[serde(default)]
    env: Option<Environment>,
    restartable: bool,
}

#[derive(Debug, Deserialize)]
struct StopParams {
    id: InstanceId,
    force: bool,
}

#[derive(Debug, Deserialize)]
struct StatusParams {
    id: InstanceId,
}

/// A validated supervisor command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Start {
        name: String,
        env: Environment,
        restartable: bool,
    },
    Stop {
        id: InstanceId,
        force: bool,
    },
    Status {
        id: InstanceId,
    },
    List,
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Command::Start { .. } => "start",
            Command::Stop { .. } => "stop",
            Command::Status { .. } => "status",
            Command::List => "list",
        }
    }
}

/// Decode a JSON body, check parameters against the command's spec and
/// produce a typed command
pub fn parse_command(body: &[u8]) -> CommandResult<Command> {
    let raw: CommandJson =
        serde_json::from_slice(body).map_err(|e| CommandError::Json(e.to_string()))?;

    let specs = param_specs(&raw.command_name)
        .ok_or_else(|| CommandError::UnknownCommand(raw.command_name.clone()))?;

    let mut params = raw.params.unwrap_or_default();

    for spec in specs {
        if params.contains_key(spec.name) {
            continue;
        }
        if spec.required {
            return Err(CommandError::MissingParameter(spec.name));
        }
        if let Some(default) = spec.default {
            params.insert(spec.name.to_string(), default());
        }
    }

    if let Some(unknown) = params
        .keys()
        .find(|key| !specs.iter().any(|spec| spec.name == key.as_str()))
    {
        return Err(CommandError::UnknownParameter(unknown.clone()));
    }

    let command = match raw.command_name.as_str() {
        "start" => {
            let p: StartParams = decode_params(params)?;
            Command::Start {
                name: p.name,
                env: p.env.unwrap_or_default(),
                restartable: p.restartable,
            }
        }
        "stop" => {
            let p: StopParams = decode_params(params)?;
            Command::Stop {
                id: p.id,
                force: p.force,
            }
        }
        "status" => {
            let p: StatusParams = decode_params(params)?;
            Command::Status { id: p.id }
        }
        _ => Command::List,
    };

    Ok(command)
}

fn decode_params<T: DeserializeOwned>(params: Map<String, Value>) -> CommandResult<T> {
    serde_json::from_value(Value::Object(params))
        .map_err(|e| CommandError::InvalidParameter(e.to_string()))
}

/// Reply bodies, one shape per outcome
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum CommandReply {
    Started { id: InstanceId },
    Done { done: bool },
    Status { status: InstanceStatus },
    List { instances: HashMap<String, InstanceStatus> },
    Error { err: String, code: String },
}

impl CommandReply {
    /// The error text, if the command failed
    pub fn error(&self) -> Option<&str> {
        match self {
            CommandReply::Error { err, .. } => Some(err),
            _ => None,
        }
    }

    fn failure(context: &str, error: SupervisorError) -> Self {
        CommandReply::Error {
            err: format!("{}: \"{}\"", context, error),
            code: error.code().to_string(),
        }
    }
}

/// Run a validated command against the registry
pub async fn execute(command: Command, registry: &InstanceRegistry) -> CommandReply {
    match command {
        Command::Start {
            name,
            env,
            restartable,
        } => match registry.start_instance(&name, env, restartable).await {
            Ok(id) => CommandReply::Started { id },
            Err(e) => CommandReply::failure("Can't start an Instance", e),
        },
        Command::Stop { id, force } => match registry.stop_instance(id, force).await {
            Ok(_) => CommandReply::Done { done: true },
            Err(e) => CommandReply::failure("Can't stop the Instance", e),
        },
        Command::Status { id } => match registry.get_instance_status(id) {
            Ok(status) => CommandReply::Status { status },
            Err(e) => CommandReply::failure("Can't get the Instance", e),
        },
        Command::List => CommandReply::List {
            instances: registry.list_instances(),
        },
    }
}
