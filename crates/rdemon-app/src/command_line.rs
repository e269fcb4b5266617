//! Remote command-line construction per debugger mode

use rdemon_core::prelude::*;
use rdemon_core::{RemoteCommand, Runnable};

use crate::config::DebugSettings;
use crate::session::{DebugCapabilities, SessionPorts};

/// `-qmljsdebugger=port:<port>,block,services:<services>`
pub fn script_debug_argument(port: u16, services: &[String]) -> String {
    format!(
        "-qmljsdebugger=port:{},block,services:{}",
        port,
        services.join(",")
    )
}

/// Build the command to spawn on the device.
///
/// - native: the helper with the debug port as its only argument
/// - script only: the application with the script debugger argument first
/// - neither: the application as configured
///
/// Environment and working directory always come from `runnable`.
pub fn build_remote_command(
    runnable: &Runnable,
    capabilities: DebugCapabilities,
    ports: SessionPorts,
    settings: &DebugSettings,
) -> Result<RemoteCommand> {
    let mut command = if capabilities.native {
        let port = ports
            .debug
            .ok_or_else(|| Error::invalid_state("native debugging without a debug port"))?;
        RemoteCommand::new(&settings.helper_executable).arg(port.to_string())
    } else if capabilities.script {
        let port = ports
            .aux
            .ok_or_else(|| Error::invalid_state("script debugging without an auxiliary port"))?;
        RemoteCommand::new(&runnable.executable)
            .arg(script_debug_argument(port, &settings.script_debug_services))
            .args(runnable.arguments.iter().cloned())
    } else {
        RemoteCommand::new(&runnable.executable).args(runnable.arguments.iter().cloned())
    };

    command.environment = runnable.environment.clone();
    command.working_directory = runnable.working_directory.clone();
    Ok(command)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn runnable() -> Runnable {
        Runnable::new("/apps/demo/bin/demo")
            .with_arguments(["-platform", "qnx", "--verbose"])
            .with_env("QT_QPA_PLATFORM", "qnx")
            .with_working_directory("/apps/demo")
    }

    #[test]
    fn test_script_debug_argument_default_services() {
        let settings = DebugSettings::default();
        assert_eq!(
            script_debug_argument(10001, &settings.script_debug_services),
            "-qmljsdebugger=port:10001,block,services:DebugMessages,QmlDebugger,V8Debugger,QmlInspector"
        );
    }

    #[test]
    fn test_native_command_is_helper_and_port() {
        let ports = SessionPorts {
            debug: Some(10000),
            aux: None,
        };
        let command = build_remote_command(
            &runnable(),
            DebugCapabilities::native(),
            ports,
            &DebugSettings::default(),
        )
        .unwrap();

        assert_eq!(command.command_line(), vec!["pdebug", "10000"]);
        assert_eq!(command.environment, runnable().environment);
        assert_eq!(command.working_directory, runnable().working_directory);
    }

    #[test]
    fn test_native_wins_when_both_requested() {
        let both = DebugCapabilities {
            native: true,
            script: true,
        };
        let ports = SessionPorts {
            debug: Some(10000),
            aux: Some(10001),
        };
        let command =
            build_remote_command(&runnable(), both, ports, &DebugSettings::default()).unwrap();
        assert_eq!(command.command_line(), vec!["pdebug", "10000"]);
    }

    #[test]
    fn test_script_command_prepends_debug_argument() {
        let ports = SessionPorts {
            debug: None,
            aux: Some(10002),
        };
        let settings = DebugSettings::default();
        let command =
            build_remote_command(&runnable(), DebugCapabilities::script(), ports, &settings)
                .unwrap();

        let line = command.command_line();
        assert_eq!(line[0], "/apps/demo/bin/demo");
        assert_eq!(
            line[1],
            script_debug_argument(10002, &settings.script_debug_services)
        );
        assert_eq!(&line[2..], ["-platform", "qnx", "--verbose"]);
    }

    #[test]
    fn test_plain_command_is_unmodified() {
        let command = build_remote_command(
            &runnable(),
            DebugCapabilities::default(),
            SessionPorts::default(),
            &DebugSettings::default(),
        )
        .unwrap();

        assert_eq!(command.executable, "/apps/demo/bin/demo");
        assert_eq!(command.arguments, runnable().arguments);
        assert_eq!(command.environment, runnable().environment);
    }

    #[test]
    fn test_missing_port_is_rejected() {
        let result = build_remote_command(
            &runnable(),
            DebugCapabilities::native(),
            SessionPorts::default(),
            &DebugSettings::default(),
        );
        assert!(matches!(result, Err(Error::InvalidState { .. })));
    }

    #[test]
    fn test_custom_helper_name() {
        let settings = DebugSettings {
            helper_executable: "pdebug-armle".to_string(),
            ..DebugSettings::default()
        };
        let ports = SessionPorts {
            debug: Some(10010),
            aux: None,
        };
        let command = build_remote_command(
            &Runnable::new("/bin/a"),
            DebugCapabilities::native(),
            ports,
            &settings,
        )
        .unwrap();
        assert_eq!(command.command_line(), vec!["pdebug-armle", "10010"]);
    }
}
