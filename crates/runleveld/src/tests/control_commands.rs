//! Control-socket commands exercised through the protocol client.

use std::sync::{Arc, mpsc};
use std::thread;
use std::time::Duration;

use rstest::{fixture, rstest};
use runlevel_protocol::{ClientError, ControlClient, Runlevel, ToolKind};
use tempfile::TempDir;

use super::support::{
    DEADLINE, HealthEvent, RecordingHealthReporter, RecordingRespawner, eventually, test_config,
};
use crate::control::{StartupError, ToolError};
use crate::engine::HookError;
use crate::supervisor::{Supervisor, SupervisorBuilder};

struct Running {
    supervisor: Supervisor,
    client: ControlClient,
    reporter: Arc<RecordingHealthReporter>,
    respawner: Arc<RecordingRespawner>,
    _dir: TempDir,
}

fn running(configure: impl FnOnce(&mut runlevel_config::Config)) -> Running {
    let dir = tempfile::tempdir().expect("temp dir");
    let mut config = test_config(&dir);
    configure(&mut config);
    let reporter = Arc::new(RecordingHealthReporter::default());
    let respawner = Arc::new(RecordingRespawner::default());
    let supervisor = SupervisorBuilder::new(config)
        .reporter(reporter.clone())
        .respawner(respawner.clone())
        .connection_grace(Duration::ZERO)
        .tool(ToolKind::Update, || Ok("Already up to date.".to_owned()))
        .tool(ToolKind::Rebuild, || {
            Err(ToolError::new("Compiling runleveld", "build failed"))
        })
        .command("echo", |args: &str| Ok(args.to_owned()))
        .build()
        .expect("build supervisor");
    supervisor.start().expect("enter default level");
    let client = ControlClient::new(supervisor.socket_path()).expect("control client");
    Running {
        supervisor,
        client,
        reporter,
        respawner,
        _dir: dir,
    }
}

#[fixture]
fn server() -> Running {
    running(|_| {})
}

fn send(client: &ControlClient, line: &str) -> Result<String, ClientError> {
    let (command, args) = line.split_once(' ').unwrap_or((line, ""));
    let args: Vec<&str> = args.split_whitespace().collect();
    client.send(command, &args)
}

#[rstest]
#[case::hello("HELLO runlevelctl", "HELLO runleveld-test")]
#[case::query_level("runlevel", "3")]
#[case::tool("update", "Already up to date.")]
#[case::disabled_tool("upgrade", "upgrade is not enabled")]
#[case::registered_word("echo one two", "one two")]
#[case::undefined_custom("CUSTOM ping", "not defined: \"ping\"")]
fn commands_reply_with_text(server: Running, #[case] line: &str, #[case] expected: &str) {
    assert_eq!(send(&server.client, line).expect("reply"), expected);
}

#[rstest]
#[case::unknown("frobnicate", "Command not found: frobnicate")]
#[case::failed_tool("rebuild", "Compiling runleveld\nERROR: build failed")]
#[case::bad_level("telinit 9", "runlevel")]
#[case::missing_level("telinit", "telinit")]
fn commands_reply_with_errors(server: Running, #[case] line: &str, #[case] fragment: &str) {
    match send(&server.client, line) {
        Err(ClientError::Remote { message }) => {
            assert!(message.contains(fragment), "{message:?} lacks {fragment:?}");
        }
        other => panic!("expected remote error, got {other:?}"),
    }
}

#[rstest]
fn status_reports_configuration_and_level(server: Running) {
    let status = send(&server.client, "status").expect("status");
    assert!(status.contains("Server Name: runleveld-test"), "{status}");
    assert!(status.contains("Current Runlevel: 3"), "{status}");
    assert!(status.contains("(Listening)"), "{status}");
}

#[rstest]
fn help_lists_builtins_tools_and_words(server: Running) {
    let help = send(&server.client, "help").expect("help");
    assert!(help.starts_with("Commands: help status telinit runlevel KICK"), "{help}");
    assert!(help.ends_with("update rebuild echo"), "{help}");
}

#[rstest]
fn level_commands_drive_transitions(server: Running) {
    assert_eq!(send(&server.client, "runlevel 1").expect("runlevel 1"), "1");
    assert_eq!(server.supervisor.level(), Runlevel::Single);
    assert_eq!(server.supervisor.open_listeners(), 0);

    assert_eq!(send(&server.client, "telinit 3").expect("telinit 3"), "DONE");
    assert_eq!(server.supervisor.level(), Runlevel::Multi);
    assert_eq!(server.supervisor.open_listeners(), 1);
}

#[rstest]
fn kick_is_refused_when_not_kickable() {
    let server = running(|config| config.kickable = false);
    assert_eq!(send(&server.client, "KICK").expect("kick"), "NO WAY");
    assert!(!server.supervisor.wait_timeout(Duration::from_millis(200)));
    assert_eq!(server.supervisor.level(), Runlevel::Multi);
    assert!(
        server
            .reporter
            .events()
            .contains(&HealthEvent::Kick { accepted: false })
    );
}

#[rstest]
fn kick_halts_a_kickable_supervisor(server: Running) {
    assert_eq!(send(&server.client, "KICK").expect("kick"), "OKAY");
    assert!(server.supervisor.wait_timeout(DEADLINE), "kick must halt");
    assert_eq!(server.supervisor.level(), Runlevel::Halt);
    assert!(!server.supervisor.socket_path().exists());
    assert!(matches!(
        send(&server.client, "status"),
        Err(error) if error.is_not_running()
    ));
}

#[rstest]
fn redeploy_spawns_a_replacement_then_halts(server: Running) {
    assert_eq!(send(&server.client, "redeploy").expect("redeploy"), "Redeploying");
    assert!(server.supervisor.wait_timeout(DEADLINE));
    assert_eq!(server.respawner.calls(), 1);
    assert!(server.reporter.events().contains(&HealthEvent::Redeploy));
}

#[rstest]
fn reconfig_reopens_listeners(server: Running) {
    let before = server.supervisor.local_addrs();
    assert_eq!(send(&server.client, "reconfig").expect("reconfig"), "Reconfiguring");
    assert!(eventually(|| {
        server
            .reporter
            .transitions()
            .ends_with(&[
                (Runlevel::Multi, Runlevel::Single),
                (Runlevel::Single, Runlevel::Multi),
            ])
    }));
    assert_eq!(server.supervisor.level(), Runlevel::Multi);
    assert_eq!(server.supervisor.open_listeners(), before.len());
}

#[rstest]
fn second_instance_without_kicks_reports_already_running(server: Running) {
    let mut config = server.supervisor.config().clone();
    config.kicks = false;
    let error = SupervisorBuilder::new(config)
        .build()
        .err()
        .expect("second instance must not start");
    assert!(matches!(error, StartupError::AlreadyRunning { .. }), "{error}");
    assert_eq!(send(&server.client, "runlevel").expect("first still serves"), "3");
}

#[rstest]
fn second_instance_is_turned_away_by_unkickable_occupant() {
    let server = running(|config| config.kickable = false);
    let config = server.supervisor.config().clone();
    let error = SupervisorBuilder::new(config)
        .build()
        .err()
        .expect("second instance must not start");
    assert!(matches!(error, StartupError::KickRefused { .. }), "{error}");
    assert!(!server.supervisor.is_halted());
}

#[rstest]
fn runlevel_reply_names_the_committed_level_despite_a_queued_transition() {
    let dir = tempfile::tempdir().expect("temp dir");
    let (entered, entering) = mpsc::channel();
    let supervisor = SupervisorBuilder::new(test_config(&dir))
        .connection_grace(Duration::ZERO)
        .hook(Runlevel::Single, move || {
            let _ = entered.send(());
            thread::sleep(Duration::from_millis(100));
            Ok::<(), HookError>(())
        })
        .build()
        .expect("build supervisor");
    supervisor.start().expect("enter default level");
    let client = ControlClient::new(supervisor.socket_path()).expect("control client");

    let request = thread::spawn(move || send(&client, "runlevel 1"));
    entering.recv_timeout(DEADLINE).expect("single-user hook runs");
    supervisor
        .transition(Runlevel::Custom)
        .expect("queued transition commits");

    let reply = request.join().expect("request thread").expect("reply");
    assert_eq!(reply, "1");
    assert_eq!(supervisor.level(), Runlevel::Custom);
}

#[rstest]
fn slow_halting_occupant_is_replaced_after_a_single_kick() {
    let dir = tempfile::tempdir().expect("temp dir");
    let reporter = Arc::new(RecordingHealthReporter::default());
    let first = SupervisorBuilder::new(test_config(&dir))
        .reporter(reporter.clone())
        .connection_grace(Duration::ZERO)
        .hook(Runlevel::Halt, || {
            thread::sleep(Duration::from_millis(1500));
            Ok::<(), HookError>(())
        })
        .build()
        .expect("build first instance");
    first.start().expect("first enters default level");

    let second = SupervisorBuilder::new(first.config().clone())
        .connection_grace(Duration::ZERO)
        .build()
        .expect("second instance outlasts the slow halt");
    assert!(first.wait_timeout(DEADLINE), "kicked instance halts");
    let kicks = reporter
        .events()
        .into_iter()
        .filter(|event| *event == HealthEvent::Kick { accepted: true })
        .count();
    assert_eq!(kicks, 1);

    second.start().expect("second enters default level");
    let client = ControlClient::new(second.socket_path()).expect("control client");
    assert_eq!(send(&client, "runlevel").expect("second serves"), "3");
}
