//! Host bridge tests against scripted daemons
//!
//! `/bin/sh` scripts stand in for `tourboxd`: they print event lines and
//! exit (or wait for SIGINT) the way the daemon does.
//!
//! Run with: `cargo test -p bridge --test bridge_tests`

use bridge::{
    BridgeConfig, EventHandler, HostBridge, NixSignaller, ProcessSignaller, StartOutcome,
    StopOutcome,
};
use nix::sys::signal::Signal;
use protocol::{Action, Control, Event};
use std::process::ExitStatus;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::{Duration, Instant};

const TICK: Duration = Duration::from_millis(10);
const DEADLINE: Duration = Duration::from_secs(10);

/// Waits for SIGINT, then exits 0
const INTERRUPTIBLE: &str =
    "trap 'exit 0' INT; echo TallDialPress; while :; do sleep 0.05; done";

#[derive(Default)]
struct Recorder {
    events: Vec<Event>,
    exits: Vec<Option<ExitStatus>>,
}

impl Recorder {
    fn names(&self) -> Vec<String> {
        self.events.iter().map(Event::name).collect()
    }
}

impl EventHandler for Recorder {
    fn on_event(&mut self, event: &Event) {
        self.events.push(event.clone());
    }

    fn on_daemon_exit(&mut self, status: Option<ExitStatus>) {
        self.exits.push(status);
    }
}

/// Forwards to the real signaller and counts calls
struct CountingSignaller {
    count: Arc<AtomicUsize>,
}

impl ProcessSignaller for CountingSignaller {
    fn interrupt(&self, pid: u32) -> bridge::Result<()> {
        self.count.fetch_add(1, Ordering::SeqCst);
        NixSignaller.interrupt(pid)
    }
}

/// Shell daemons never unblock interrupts, so they are launched without
/// deferral
fn script(body: &str) -> BridgeConfig {
    let mut config = BridgeConfig::for_program("/bin/sh", ["-c", body]);
    config.daemon.defer_interrupts = false;
    config
}

fn counting_bridge(body: &str) -> (HostBridge, Arc<AtomicUsize>) {
    let count = Arc::new(AtomicUsize::new(0));
    let bridge = HostBridge::with_signaller(
        script(body),
        Box::new(CountingSignaller {
            count: Arc::clone(&count),
        }),
    );
    (bridge, count)
}

/// Tick until `done` holds or the deadline passes
fn tick_until(
    bridge: &mut HostBridge,
    recorder: &mut Recorder,
    done: impl Fn(&HostBridge, &Recorder) -> bool,
) {
    let deadline = Instant::now() + DEADLINE;
    while !done(bridge, recorder) {
        assert!(Instant::now() < deadline, "timed out waiting for bridge");
        bridge.dispatch(recorder);
        thread::sleep(TICK);
    }
}

fn run_to_exit(body: &str) -> (HostBridge, Recorder) {
    run_config_to_exit(script(body))
}

fn run_config_to_exit(config: BridgeConfig) -> (HostBridge, Recorder) {
    let mut bridge = HostBridge::new(config);
    assert_eq!(bridge.start().unwrap(), StartOutcome::Started);

    let mut recorder = Recorder::default();
    tick_until(&mut bridge, &mut recorder, |_, r| !r.exits.is_empty());
    (bridge, recorder)
}

mod scenarios {
    use super::*;

    #[test]
    fn test_press_turn_release_in_order() {
        let (bridge, recorder) =
            run_to_exit("printf 'TallDialPress\\nTallDialRight\\nTallDialRelease\\n'");

        assert_eq!(
            recorder.events,
            vec![
                Event::input(Control::TallDial, Action::Press),
                Event::input(Control::TallDial, Action::Right),
                Event::input(Control::TallDial, Action::Release),
            ]
        );
        assert_eq!(bridge.delivered(), 3);
    }

    #[test]
    fn test_unknown_and_blank_lines_dropped() {
        let (_bridge, recorder) = run_to_exit("printf 'Unknown\\n\\nMouseWheelUp\\n'");
        assert_eq!(recorder.names(), vec!["MouseWheelUp"]);
    }

    #[test]
    fn test_malformed_lines_do_not_disturb_neighbours() {
        let (_bridge, recorder) =
            run_to_exit("printf 'DpadUpPress\\n\\377\\376\\nTall Dial\\nDpadUpRelease\\n'");
        assert_eq!(recorder.names(), vec!["DpadUpPress", "DpadUpRelease"]);
    }

    #[test]
    fn test_unrecognized_names_are_delivered() {
        let (_bridge, recorder) = run_to_exit("printf 'JogShuttleLeft\\nShortButtonPress\\n'");
        assert_eq!(recorder.names(), vec!["JogShuttleLeft", "ShortButtonPress"]);
        assert!(!recorder.events[0].as_input().unwrap().is_recognized());
    }

    #[test]
    fn test_many_events_keep_order() {
        let (_bridge, recorder) = run_to_exit(
            "i=0; while [ $i -lt 200 ]; do echo FlatWheelLeft; echo FlatWheelRight; i=$((i+1)); done",
        );
        assert_eq!(recorder.events.len(), 400);
        for pair in recorder.names().chunks(2) {
            assert_eq!(pair, ["FlatWheelLeft", "FlatWheelRight"]);
        }
    }
}

mod lifecycle {
    use super::*;

    #[test]
    fn test_stop_when_never_started() {
        let (mut bridge, signals) = counting_bridge(INTERRUPTIBLE);
        assert_eq!(bridge.stop(), StopOutcome::NotRunning);
        assert_eq!(signals.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_start_is_idempotent_and_stop_signals_once() {
        let (mut bridge, signals) = counting_bridge(INTERRUPTIBLE);

        assert_eq!(bridge.start().unwrap(), StartOutcome::Started);
        let pid = bridge.pid();
        assert_eq!(bridge.start().unwrap(), StartOutcome::AlreadyRunning);
        assert_eq!(bridge.pid(), pid);

        let mut recorder = Recorder::default();
        tick_until(&mut bridge, &mut recorder, |_, r| !r.events.is_empty());
        assert_eq!(recorder.names(), vec!["TallDialPress"]);

        assert_eq!(bridge.stop(), StopOutcome::Signalled);
        assert!(!bridge.is_running());
        assert_eq!(bridge.stop(), StopOutcome::NotRunning);
        assert_eq!(signals.load(Ordering::SeqCst), 1);

        // The stopped daemon's exit is not reported as an unexpected death
        thread::sleep(Duration::from_millis(300));
        bridge.dispatch(&mut recorder);
        assert!(recorder.exits.is_empty());
    }

    #[test]
    fn test_daemon_death_is_observed() {
        let (mut bridge, signals) = counting_bridge("echo SideThumbPress; exit 2");
        bridge.start().unwrap();

        let mut recorder = Recorder::default();
        tick_until(&mut bridge, &mut recorder, |b, _| !b.is_running());

        assert_eq!(recorder.names(), vec!["SideThumbPress"]);
        assert_eq!(recorder.exits.len(), 1);
        assert_eq!(recorder.exits[0].and_then(|s| s.code()), Some(2));

        assert_eq!(bridge.stop(), StopOutcome::NotRunning);
        assert_eq!(signals.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_exited_but_undispatched_daemon_is_not_signalled() {
        let (mut bridge, signals) = counting_bridge("exit 0");
        bridge.start().unwrap();

        // Let the reader reap the process without dispatching its exit
        thread::sleep(Duration::from_millis(500));

        assert_eq!(bridge.stop(), StopOutcome::NotRunning);
        assert_eq!(signals.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_restart_after_stop() {
        let (mut bridge, signals) = counting_bridge(INTERRUPTIBLE);
        let mut recorder = Recorder::default();

        for round in 1..=2 {
            assert_eq!(bridge.start().unwrap(), StartOutcome::Started);
            tick_until(&mut bridge, &mut recorder, |_, r| r.events.len() == round);
            assert_eq!(bridge.stop(), StopOutcome::Signalled);
        }

        assert_eq!(signals.load(Ordering::SeqCst), 2);
        assert_eq!(recorder.names(), vec!["TallDialPress", "TallDialPress"]);
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_daemon_starts_with_interrupts_deferred() {
        // Prints the shell's blocked-signal mask as a single hex token
        let mut config = script(
            "while read -r key value; do \
             if [ \"$key\" = SigBlk: ]; then echo \"$value\"; fi; \
             done < /proc/self/status",
        );
        config.daemon.defer_interrupts = true;

        let (_bridge, recorder) = run_config_to_exit(config);

        let names = recorder.names();
        assert_eq!(names.len(), 1, "unexpected output: {:?}", names);
        let blocked = u64::from_str_radix(&names[0], 16).unwrap();
        let sigint = 1u64 << (Signal::SIGINT as i32 - 1);
        let sigterm = 1u64 << (Signal::SIGTERM as i32 - 1);
        assert_eq!(blocked & sigint, sigint);
        assert_eq!(blocked & sigterm, sigterm);
    }

    #[test]
    fn test_drop_stops_daemon() {
        let (mut bridge, signals) = counting_bridge(INTERRUPTIBLE);
        bridge.start().unwrap();
        drop(bridge);
        assert_eq!(signals.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_closure_handler() {
        let mut bridge = HostBridge::new(script("echo LogoButtonLeftPress"));
        bridge.start().unwrap();

        let mut names = Vec::new();
        let deadline = Instant::now() + DEADLINE;
        while names.is_empty() {
            assert!(Instant::now() < deadline, "timed out waiting for event");
            bridge.dispatch(&mut |event: &Event| names.push(event.name()));
            thread::sleep(TICK);
        }
        assert_eq!(names, vec!["LogoButtonLeftPress"]);
    }
}
