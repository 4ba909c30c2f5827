/*!
 * API Module
 * JSON command intake over HTTP
 */

pub mod command;
pub mod server;

pub use command::{execute, parse_command, Command, CommandError, CommandReply, CommandResult};
pub use server::{router, serve};
