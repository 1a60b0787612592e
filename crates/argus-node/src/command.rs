//! Operator commands arriving from the transport.

use argus_core::{ArgusError, BoostConfig, BoostKind, OperatingMode};
use serde::Deserialize;
use thiserror::Error;

use crate::state::TelemetrySnapshot;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    SetMode(OperatingMode),
    SetBoost(i32),
    /// Switching the boost kind also resets its value.
    SetBoostKind(BoostKind),
    SetSimBasePower(i32),
    Disconnect,
}

#[derive(Debug, Error)]
pub enum CommandError {
    #[error("malformed command: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error(transparent)]
    Invalid(#[from] ArgusError),
}

/// JSON object accepted on the websocket. Every key is optional.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransportCommand {
    pub mode: Option<String>,
    pub boost: Option<f64>,
    pub sim: Option<f64>,
    pub boost_type: Option<String>,
    pub disconnect: Option<bool>,
}

impl TransportCommand {
    pub fn parse(text: &str) -> Result<Self, CommandError> {
        Ok(serde_json::from_str(text)?)
    }

    /// Expands into commands in apply order: mode, boost, sim base, boost
    /// kind, then disconnect.
    pub fn into_commands(self) -> Result<Vec<Command>, CommandError> {
        let mut commands = Vec::new();
        if let Some(mode) = self.mode {
            commands.push(Command::SetMode(mode.parse()?));
        }
        if let Some(boost) = self.boost {
            commands.push(Command::SetBoost(boost as i32));
        }
        if let Some(sim) = self.sim {
            commands.push(Command::SetSimBasePower(sim as i32));
        }
        if let Some(kind) = self.boost_type {
            commands.push(Command::SetBoostKind(kind.parse()?));
        }
        if self.disconnect == Some(true) {
            commands.push(Command::Disconnect);
        }
        Ok(commands)
    }
}

/// Applies a settings command. `Disconnect` needs the radio and is left to
/// the link control; returns false for it.
pub fn apply_setting(t: &mut TelemetrySnapshot, command: Command) -> bool {
    match command {
        Command::SetMode(mode) => t.mode = mode,
        Command::SetBoost(value) => t.boost.value = value,
        Command::SetBoostKind(kind) => t.boost = BoostConfig { kind, value: 0 },
        Command::SetSimBasePower(watts) => t.sim_base_power = watts,
        Command::Disconnect => return false,
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_full_command_in_apply_order() {
        let cmd = TransportCommand::parse(
            r#"{"disconnect":true,"boostType":"pct","sim":180,"boost":12.7,"mode":"bridge"}"#,
        )
        .unwrap();
        assert_eq!(
            cmd.into_commands().unwrap(),
            vec![
                Command::SetMode(OperatingMode::Bridge),
                Command::SetBoost(12),
                Command::SetSimBasePower(180),
                Command::SetBoostKind(BoostKind::Percent),
                Command::Disconnect,
            ]
        );
    }

    #[test]
    fn empty_object_is_no_op() {
        assert!(TransportCommand::parse("{}").unwrap().into_commands().unwrap().is_empty());
        let cmd = TransportCommand::parse(r#"{"disconnect":false}"#).unwrap();
        assert!(cmd.into_commands().unwrap().is_empty());
    }

    #[test]
    fn rejects_unknown_mode_and_bad_json() {
        let cmd = TransportCommand::parse(r#"{"mode":"turbo"}"#).unwrap();
        assert!(matches!(cmd.into_commands(), Err(CommandError::Invalid(_))));
        assert!(matches!(TransportCommand::parse("not json"), Err(CommandError::Malformed(_))));
    }

    #[test]
    fn boost_kind_resets_value() {
        let mut t = TelemetrySnapshot::default();
        for c in [Command::SetBoost(40), Command::SetBoostKind(BoostKind::Percent)] {
            assert!(apply_setting(&mut t, c));
        }
        assert_eq!(t.boost, BoostConfig::percent(0));
        assert!(!apply_setting(&mut t, Command::Disconnect));
    }
}
