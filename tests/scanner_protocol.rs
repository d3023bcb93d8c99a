//! Controller board protocol driven through the scripted serial link.

use bench_daq::adapters::{MockAdapter, SerialLink};
use bench_daq::config::{OpenLoopConfig, SerialConfig};
use bench_daq::error::{AppResult, DaqError};
use bench_daq::instrument::{OpenLoopSample, ScannerController};
use bench_daq::protocol::{Channel, OpenLoopAck, Position};
use std::collections::VecDeque;
use std::thread;
use std::time::{Duration, Instant};

/// Board that answers `C` and `M_<x>_<y>_!` after a per-request delay.
///
/// A move reply reports the measured position as ten times the target.
struct DelayedBoard {
    delays: VecDeque<Duration>,
    fallback: Duration,
    pending: Vec<(Instant, Vec<u8>)>,
}

impl DelayedBoard {
    fn new(delays_ms: &[u64], fallback_ms: u64) -> Self {
        Self {
            delays: delays_ms.iter().map(|&ms| Duration::from_millis(ms)).collect(),
            fallback: Duration::from_millis(fallback_ms),
            pending: Vec::new(),
        }
    }

    fn answer(frame: &str) -> Option<String> {
        let body = frame.trim_end();
        if body == "C" {
            return Some("C\r\n".to_string());
        }
        match body.split('_').collect::<Vec<_>>().as_slice() {
            ["M", x, y, "!"] => {
                let x: f64 = x.parse().ok()?;
                let y: f64 = y.parse().ok()?;
                Some(format!("M_{x}_{y}_{}_{}_!\r\n", x * 10.0, y * 10.0))
            }
            _ => None,
        }
    }
}

impl SerialLink for DelayedBoard {
    fn name(&self) -> &str {
        "delayed"
    }

    fn write_frame(&mut self, frame: &[u8]) -> AppResult<()> {
        if let Some(reply) = Self::answer(&String::from_utf8_lossy(frame)) {
            let delay = self.delays.pop_front().unwrap_or(self.fallback);
            self.pending.push((Instant::now() + delay, reply.into_bytes()));
        }
        Ok(())
    }

    fn bytes_waiting(&mut self) -> AppResult<usize> {
        let now = Instant::now();
        Ok(self
            .pending
            .iter()
            .filter(|(at, _)| *at <= now)
            .map(|(_, bytes)| bytes.len())
            .sum())
    }

    fn read_waiting(&mut self) -> AppResult<Vec<u8>> {
        let now = Instant::now();
        let (ready, later): (Vec<_>, Vec<_>) =
            self.pending.drain(..).partition(|(at, _)| *at <= now);
        self.pending = later;
        Ok(ready.into_iter().flat_map(|(_, bytes)| bytes).collect())
    }

    fn clear_input(&mut self) -> AppResult<()> {
        let now = Instant::now();
        self.pending.retain(|(at, _)| *at > now);
        Ok(())
    }
}

fn fast_serial() -> SerialConfig {
    SerialConfig {
        response_timeout_ms: Some(200),
        connection_check_interval_ms: 5,
        ..SerialConfig::default()
    }
}

fn board(mock: &MockAdapter) -> ScannerController {
    board_with(mock, fast_serial(), OpenLoopConfig::default())
}

fn board_with(mock: &MockAdapter, serial: SerialConfig, open_loop: OpenLoopConfig) -> ScannerController {
    let mut ctrl = ScannerController::new(serial, &open_loop);
    ctrl.attach(Box::new(mock.clone()));
    ctrl
}

#[test]
fn test_query_position() {
    let mock = MockAdapter::new();
    mock.reply_to("A_", "A_12.5_-3.2_!\r\n");
    let mut ctrl = board(&mock);

    let pos = ctrl.query_position().unwrap();
    assert_eq!(pos, Some(Position::new(12.5, -3.2)));
    assert_eq!(ctrl.photodiode_position(), Some(Position::new(12.5, -3.2)));
    assert_eq!(mock.sent(), vec!["A_!\r\n"]);
}

#[test]
fn test_query_position_missing_field_is_none() {
    let mock = MockAdapter::new();
    mock.reply_to("A_", "A_12.5_!\r\n");
    let mut ctrl = board(&mock);

    assert_eq!(ctrl.query_position().unwrap(), None);
    assert_eq!(ctrl.photodiode_position(), None);
}

#[test]
fn test_partial_frame_returned_after_silence() {
    let mock = MockAdapter::new();
    mock.reply_to("A_", "A_1_2");
    let mut ctrl = board(&mock);

    let start = Instant::now();
    assert_eq!(ctrl.query_position().unwrap(), None);
    assert!(start.elapsed() < Duration::from_millis(200));
}

#[test]
fn test_move_reports_measured_position() {
    let mock = MockAdapter::new();
    mock.reply_to("M_", "M_100_200_98.5_201.25_!\r\n");
    let mut ctrl = board(&mock);

    let pos = ctrl.move_to(100.0, 200.0).unwrap();
    assert_eq!(pos, Some(Position::new(98.5, 201.25)));
    assert_eq!(ctrl.scan_position(), Position::new(100.0, 200.0));
    assert_eq!(mock.sent(), vec!["M_100_200_!\r\n"]);
}

#[test]
fn test_stop_and_reset_do_not_wait() {
    let mock = MockAdapter::new();
    let mut ctrl = board(&mock);

    let start = Instant::now();
    ctrl.stop().unwrap();
    ctrl.reset_open_loop_scan().unwrap();
    assert!(start.elapsed() < Duration::from_millis(100));
    assert_eq!(mock.sent(), vec!["O_!\r\n", "R_!\r\n"]);
}

#[test]
fn test_write_failure_propagates() {
    let mock = MockAdapter::new();
    let mut ctrl = board(&mock);
    mock.inject_next_failure();

    assert!(matches!(ctrl.stop(), Err(DaqError::Io(_))));
    assert!(ctrl.stop().is_ok());
}

#[test]
fn test_no_reply_times_out() {
    let mock = MockAdapter::new();
    let mut ctrl = board(&mock);

    match ctrl.move_to(1.0, 1.0) {
        Err(DaqError::Timeout { command, waited }) => {
            assert_eq!(command, "M_1_1_!");
            assert_eq!(waited, Duration::from_millis(200));
        }
        other => panic!("expected timeout, got {other:?}"),
    }
}

#[test]
fn test_connection_check_answered() {
    let mock = MockAdapter::new();
    mock.reply_to("C", "C\r\n");
    let mut ctrl = board(&mock);

    assert!(ctrl.check_connection());
    assert_eq!(mock.sent(), vec!["C"]);
}

#[test]
fn test_connection_check_wrong_answer() {
    let mock = MockAdapter::new();
    mock.reply_to("C", "X\r\n");
    let mut ctrl = board(&mock);

    assert!(!ctrl.check_connection());
}

#[test]
fn test_connection_check_gives_up_within_budget() {
    let mock = MockAdapter::new();
    let mut ctrl = board_with(&mock, SerialConfig::default(), OpenLoopConfig::default());

    let start = Instant::now();
    assert!(!ctrl.check_connection());
    let elapsed = start.elapsed();
    assert!(elapsed >= Duration::from_millis(900), "{elapsed:?}");
    assert!(elapsed < Duration::from_millis(1500), "{elapsed:?}");
}

#[test]
fn test_connect_failure_reports_false() {
    let mut ctrl = ScannerController::new(fast_serial(), &OpenLoopConfig::default())
        .with_opener(|port: &str, _baud: u32| {
            Err(DaqError::Configuration(format!("no such port {port}")))
        });

    assert!(!ctrl.connect("/dev/does-not-exist"));
    assert!(!ctrl.is_connected());
    assert!(matches!(ctrl.stop(), Err(DaqError::SerialPortNotConnected)));
}

#[test]
fn test_connect_and_disconnect() {
    let mock = MockAdapter::new();
    let opened = mock.clone();
    let mut ctrl = ScannerController::new(fast_serial(), &OpenLoopConfig::default())
        .with_opener(move |_port: &str, baud: u32| {
            assert_eq!(baud, 115_200);
            Ok(Box::new(opened.clone()) as Box<dyn SerialLink>)
        });

    assert!(ctrl.connect("/dev/ttyACM0"));
    assert!(ctrl.is_connected());
    ctrl.stop().unwrap();
    ctrl.disconnect();
    assert!(!ctrl.is_connected());
    assert_eq!(mock.sent(), vec!["O_!\r\n"]);
}

#[test]
fn test_open_loop_capture() {
    let mock = MockAdapter::new();
    let open_loop = OpenLoopConfig {
        sampling_frequency: 2000,
        samples: 2,
        ..OpenLoopConfig::default()
    };
    let mut ctrl = board_with(&mock, fast_serial(), open_loop);
    ctrl.set_open_loop_steps(10, 20, -10, -20);

    mock.reply_to("S_", "S_OK!\r\n");
    assert_eq!(ctrl.start_open_loop_scan().unwrap(), Some(OpenLoopAck::Accepted));
    assert_eq!(mock.sent(), vec!["S_10_-10_20_-20_2000_!\r\n"]);

    for index in 0..2 {
        for channel in Channel::ALL {
            let reply = if index == 1 && channel == Channel::Y {
                "T_Y_1_oops_!\r\n".to_string()
            } else {
                format!("T_{channel}_{index}_{}.5_!\r\n", index * 10)
            };
            mock.reply_to(&format!("T_{channel}_{index}_"), &reply);
        }
    }

    let data = ctrl.acquire_open_loop_data().unwrap();
    assert_eq!(
        data,
        vec![
            OpenLoopSample {
                index: 0,
                x: Some(0.5),
                y: Some(0.5),
                step: Some(0.5),
            },
            OpenLoopSample {
                index: 1,
                x: Some(10.5),
                y: None,
                step: Some(10.5),
            },
        ]
    );
    assert_eq!(mock.pending_replies(), 0);
}

#[test]
fn test_open_loop_rejected() {
    let mock = MockAdapter::new();
    mock.reply_to("S_", "S_NK!\r\n");
    let mut ctrl = board(&mock);

    assert_eq!(ctrl.start_open_loop_scan().unwrap(), Some(OpenLoopAck::Rejected));
}

#[test]
fn test_parameter_setters() {
    let mock = MockAdapter::new();
    let mut ctrl = board(&mock);

    ctrl.set_sampling_frequency(500);
    ctrl.set_open_loop_samples(7).unwrap();
    assert_eq!(ctrl.sampling_frequency(), 500);
    assert_eq!(ctrl.open_loop_samples(), 7);

    mock.reply_to("S_", "S_OK!");
    ctrl.start_open_loop_scan().unwrap();
    assert_eq!(mock.sent(), vec!["S_0_0_0_0_500_!\r\n"]);
}

#[test]
fn test_sample_count_limited_by_board() {
    let mock = MockAdapter::new();
    let mut ctrl = board(&mock);

    assert!(matches!(
        ctrl.set_open_loop_samples(0),
        Err(DaqError::Configuration(_))
    ));
    assert!(matches!(
        ctrl.set_open_loop_samples(u32::MAX),
        Err(DaqError::Configuration(_))
    ));
    assert_eq!(ctrl.open_loop_samples(), 100);
    ctrl.set_open_loop_samples(1000).unwrap();
    assert_eq!(ctrl.open_loop_samples(), 1000);
}

#[test]
fn test_huge_sample_count_times_out_instead_of_allocating() {
    let mock = MockAdapter::new();
    let open_loop = OpenLoopConfig {
        max_samples: u32::MAX,
        ..OpenLoopConfig::default()
    };
    let mut ctrl = board_with(&mock, fast_serial(), open_loop);
    ctrl.set_open_loop_samples(u32::MAX).unwrap();

    assert!(matches!(
        ctrl.acquire_open_loop_data(),
        Err(DaqError::Timeout { .. })
    ));
}

#[test]
fn test_late_reply_discarded_before_next_command() {
    let mock = MockAdapter::new();
    let mut ctrl = board(&mock);

    assert!(matches!(ctrl.move_to(1.0, 1.0), Err(DaqError::Timeout { .. })));

    // the board answers the first move after the controller gave up
    mock.push_incoming(b"M_1_1_10_10_!\r\n");
    mock.reply_to("M_", "M_2_2_5_5_!\r\n");

    assert_eq!(ctrl.move_to(2.0, 2.0).unwrap(), Some(Position::new(5.0, 5.0)));
    assert_eq!(ctrl.photodiode_position(), Some(Position::new(5.0, 5.0)));
}

#[test]
fn test_slow_board_stays_in_step_after_timeout() {
    let serial = SerialConfig {
        response_timeout_ms: Some(50),
        ..fast_serial()
    };
    let mut ctrl = ScannerController::new(serial, &OpenLoopConfig::default());
    ctrl.attach(Box::new(DelayedBoard::new(&[150], 5)));

    assert!(matches!(ctrl.move_to(1.0, 1.0), Err(DaqError::Timeout { .. })));
    assert_eq!(ctrl.move_to(2.0, 2.0).unwrap(), Some(Position::new(20.0, 20.0)));
    assert_eq!(ctrl.move_to(3.0, 3.0).unwrap(), Some(Position::new(30.0, 30.0)));

    // let the reply to the first move land, then carry on
    thread::sleep(Duration::from_millis(150));
    assert_eq!(ctrl.move_to(4.0, 4.0).unwrap(), Some(Position::new(40.0, 40.0)));
}

#[test]
fn test_move_reply_for_other_target_is_none() {
    let mock = MockAdapter::new();
    mock.reply_to("M_", "M_1_1_10_10_!\r\n");
    let mut ctrl = board(&mock);

    assert_eq!(ctrl.move_to(4.0, 4.0).unwrap(), None);
    assert_eq!(ctrl.photodiode_position(), None);
}

#[test]
fn test_connection_check_sees_answer_after_last_poll() {
    let serial = SerialConfig {
        connection_check_attempts: 3,
        connection_check_interval_ms: 20,
        ..fast_serial()
    };
    let mut ctrl = ScannerController::new(serial, &OpenLoopConfig::default());
    ctrl.attach(Box::new(DelayedBoard::new(&[50], 50)));

    assert!(ctrl.check_connection());
}
