//! # Integration Tests
//!
//! 集成测试与端到端测试。
//!
//! 负责：
//! - 合约快照测试
//! - 模拟 e2e 测试（无需 Kinect）
//! - 关闭顺序与幂等性

#[cfg(test)]
mod contract_tests {
    use contracts::{CaptureConfig, FrameGeometry, PairingPolicy};

    #[test]
    fn test_default_geometry_matches_buffers() {
        let geometry = FrameGeometry::default();
        assert_eq!(geometry.color_bytes(), 640 * 480 * 3);
        assert_eq!(geometry.depth_bytes(), 640 * 480 * 2);
        assert_eq!(geometry.depth_samples(), 640 * 480);
    }

    #[test]
    fn test_default_config_round_trips_through_loader() {
        let config = CaptureConfig::default();
        let toml = config_loader::ConfigLoader::to_toml(&config).unwrap();
        let parsed =
            config_loader::ConfigLoader::load_from_str(&toml, config_loader::ConfigFormat::Toml)
                .unwrap();
        assert_eq!(parsed, config);
        assert_eq!(parsed.pull.pairing, PairingPolicy::Paired);
    }
}

/// Hand-driven collaborator: frames are delivered only when the test sends them
#[cfg(test)]
mod scripted {
    use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use contracts::{
        ContractError, DeviceBackend, DeviceContext, DeviceHandle, FrameCallback, FrameKind,
        FrameMode, Subdevices,
    };

    /// One delivery the test wants the event loop to perform
    pub struct Delivery {
        pub kind: FrameKind,
        pub bytes: Vec<u8>,
        pub timestamp: u32,
    }

    struct Shared {
        deliveries: Mutex<Receiver<Delivery>>,
        callbacks: Mutex<[Option<FrameCallback>; 2]>,
    }

    pub struct ScriptedBackend {
        shared: Arc<Shared>,
    }

    impl ScriptedBackend {
        pub fn new() -> (Self, Sender<Delivery>) {
            let (tx, rx) = mpsc::channel();
            let backend = Self {
                shared: Arc::new(Shared {
                    deliveries: Mutex::new(rx),
                    callbacks: Mutex::new([None, None]),
                }),
            };
            (backend, tx)
        }
    }

    impl DeviceBackend for ScriptedBackend {
        fn name(&self) -> &str {
            "scripted"
        }

        fn init_context(&self) -> Result<Arc<dyn DeviceContext>, ContractError> {
            Ok(Arc::new(ScriptedContext {
                shared: self.shared.clone(),
            }))
        }
    }

    struct ScriptedContext {
        shared: Arc<Shared>,
    }

    impl DeviceContext for ScriptedContext {
        fn select_subdevices(&self, _subdevices: Subdevices) {}

        fn open_device(&self, _index: u32) -> Result<Box<dyn DeviceHandle>, ContractError> {
            Ok(Box::new(ScriptedDevice {
                shared: self.shared.clone(),
            }))
        }

        fn process_events(&self, timeout: Option<Duration>) -> Result<(), ContractError> {
            let wait = timeout.unwrap_or(Duration::from_millis(10));
            let next = self.shared.deliveries.lock().unwrap().recv_timeout(wait);
            match next {
                Ok(delivery) => {
                    let callback = self.shared.callbacks.lock().unwrap()[delivery.kind.index()].clone();
                    if let Some(callback) = callback {
                        callback(&delivery.bytes, delivery.timestamp);
                    }
                    Ok(())
                }
                Err(RecvTimeoutError::Timeout) => Ok(()),
                Err(RecvTimeoutError::Disconnected) => {
                    Err(ContractError::event_loop("script ended"))
                }
            }
        }

        fn shutdown(&self) -> Result<(), ContractError> {
            Ok(())
        }
    }

    struct ScriptedDevice {
        shared: Arc<Shared>,
    }

    impl DeviceHandle for ScriptedDevice {
        fn set_frame_callback(&mut self, kind: FrameKind, callback: FrameCallback) {
            self.shared.callbacks.lock().unwrap()[kind.index()] = Some(callback);
        }

        fn set_frame_mode(&mut self, _mode: FrameMode) -> Result<(), ContractError> {
            Ok(())
        }

        fn start_stream(&mut self, _kind: FrameKind) -> Result<(), ContractError> {
            Ok(())
        }

        fn stop_stream(&mut self, _kind: FrameKind) -> Result<(), ContractError> {
            Ok(())
        }

        fn close(self: Box<Self>) -> Result<(), ContractError> {
            Ok(())
        }
    }
}

#[cfg(test)]
mod e2e_tests {
    use std::io::Write;
    use std::sync::Arc;
    use std::thread;
    use std::time::{Duration, Instant};

    use capture::{CaptureError, CaptureSession, SessionState};
    use contracts::{CaptureConfig, FrameGeometry, FrameKind, PairingPolicy};
    use device::{ColorFill, DepthFill, MockBackend, MockDeviceConfig, ProbeEvent};
    use observability::CaptureMetricsAggregator;

    use crate::scripted::{Delivery, ScriptedBackend};

    fn config(pairing: PairingPolicy, timeout_ms: Option<u64>) -> CaptureConfig {
        let mut config = CaptureConfig::default();
        config.pull.pairing = pairing;
        config.pull.timeout_ms = timeout_ms;
        config.pump.poll_timeout_ms = 10;
        config
    }

    fn buffers() -> (Vec<u8>, Vec<u16>) {
        let geometry = FrameGeometry::default();
        (
            vec![0u8; geometry.color_bytes()],
            vec![0u16; geometry.depth_samples()],
        )
    }

    /// Mock delivering 0xAA color and 0x1234 depth: first pull returns exactly those
    #[test]
    fn test_e2e_mock_fill_pattern() {
        let backend = MockBackend::with_defaults();
        let mut session = CaptureSession::new(
            Arc::new(backend.clone()),
            config(PairingPolicy::Paired, Some(2_000)),
        );
        session.initialize().unwrap();

        let (mut color, mut depth) = buffers();
        let info = session.get_frames(&mut color, &mut depth).unwrap();

        assert!(color.iter().all(|&b| b == 0xAA));
        assert!(depth.iter().all(|&d| d == 0x1234));
        assert!(info.is_paired());
        assert!(info.color.sequence >= 1 && info.depth.sequence >= 1);

        session.shutdown().unwrap();
        assert_eq!(backend.probe().devices_closed(), 1);
    }

    /// Event loop failing on its first call is reported, not a hang
    #[test]
    fn test_e2e_event_loop_failure_is_reported() {
        let backend = MockBackend::new(MockDeviceConfig {
            fail_events_after: Some(0),
            ..Default::default()
        });
        let mut session = CaptureSession::new(
            Arc::new(backend),
            config(PairingPolicy::Paired, Some(5_000)),
        );
        session.initialize().unwrap();

        let (mut color, mut depth) = buffers();
        let started = Instant::now();
        let err = session.get_frames(&mut color, &mut depth).unwrap_err();

        assert!(matches!(err, CaptureError::EventLoopFailed { .. }));
        assert!(started.elapsed() < Duration::from_secs(5));
        assert!(!session.is_pump_running());
        session.shutdown().unwrap();
    }

    /// Color-only deliveries with the `latest` policy: depth reported stale
    #[test]
    fn test_e2e_color_only_latest() {
        let (backend, frames) = ScriptedBackend::new();
        let mut session = CaptureSession::new(
            Arc::new(backend),
            config(PairingPolicy::Latest, Some(2_000)),
        );
        session.initialize().unwrap();
        let (mut color, mut depth) = buffers();

        // Nothing delivered yet: the pull must not return
        let err = session
            .get_frames_timeout(&mut color, &mut depth, Duration::from_millis(50))
            .unwrap_err();
        assert!(matches!(err, CaptureError::Timeout { .. }));

        frames
            .send(Delivery {
                kind: FrameKind::Color,
                bytes: vec![0x42; FrameGeometry::default().color_bytes()],
                timestamp: 7,
            })
            .unwrap();

        let info = session.get_frames(&mut color, &mut depth).unwrap();
        assert!(info.color.fresh);
        assert_eq!(info.color.timestamp, 7);
        assert!(!info.depth.fresh);
        assert_eq!(info.depth.sequence, 0);
        assert!(color.iter().all(|&b| b == 0x42));
        assert!(depth.iter().all(|&d| d == 0));

        session.shutdown().unwrap();
    }

    /// Color-only deliveries with the `paired` policy: the pull times out
    #[test]
    fn test_e2e_color_only_paired_times_out() {
        let (backend, frames) = ScriptedBackend::new();
        let mut session = CaptureSession::new(
            Arc::new(backend),
            config(PairingPolicy::Paired, Some(100)),
        );
        session.initialize().unwrap();

        frames
            .send(Delivery {
                kind: FrameKind::Color,
                bytes: vec![1; FrameGeometry::default().color_bytes()],
                timestamp: 1,
            })
            .unwrap();

        let (mut color, mut depth) = buffers();
        assert!(matches!(
            session.get_frames(&mut color, &mut depth),
            Err(CaptureError::Timeout { .. })
        ));

        // The matching depth delivery completes the pair
        let mut raw_depth = vec![0u8; FrameGeometry::default().depth_bytes()];
        for chunk in raw_depth.chunks_exact_mut(2) {
            chunk.copy_from_slice(&900u16.to_ne_bytes());
        }
        frames
            .send(Delivery {
                kind: FrameKind::Depth,
                bytes: raw_depth,
                timestamp: 2,
            })
            .unwrap();

        let info = session
            .get_frames_timeout(&mut color, &mut depth, Duration::from_secs(2))
            .unwrap();
        assert!(info.is_paired());
        assert!(depth.iter().all(|&d| d == 900));
        session.shutdown().unwrap();
    }

    /// Wrong-size deliveries never reach a snapshot
    #[test]
    fn test_e2e_wrong_size_delivery_ignored() {
        let (backend, frames) = ScriptedBackend::new();
        let mut session = CaptureSession::new(
            Arc::new(backend),
            config(PairingPolicy::Latest, Some(100)),
        );
        session.initialize().unwrap();

        frames
            .send(Delivery {
                kind: FrameKind::Color,
                bytes: vec![9; 10],
                timestamp: 1,
            })
            .unwrap();

        let (mut color, mut depth) = buffers();
        assert!(matches!(
            session.get_frames(&mut color, &mut depth),
            Err(CaptureError::Timeout { .. })
        ));
        assert!(color.iter().all(|&b| b == 0));
    }

    /// Counter frames: every snapshot is uniform, sequences never go back
    #[test]
    fn test_e2e_snapshots_are_whole_frames() {
        let backend = MockBackend::new(MockDeviceConfig {
            color_fill: ColorFill::Counter,
            depth_fill: DepthFill::Counter,
            ..Default::default()
        });
        let mut session = CaptureSession::new(
            Arc::new(backend),
            config(PairingPolicy::Paired, Some(2_000)),
        );
        session.initialize().unwrap();

        let (mut color, mut depth) = buffers();
        let mut last = (0, 0);
        for _ in 0..20 {
            let info = session.get_frames(&mut color, &mut depth).unwrap();
            assert!(color.iter().all(|&b| b == color[0]), "torn color frame");
            assert!(depth.iter().all(|&d| d == depth[0]), "torn depth frame");
            assert_eq!(color[0], info.color.sequence as u8);
            assert_eq!(depth[0], info.depth.sequence as u16);
            assert!(info.color.sequence > last.0 && info.depth.sequence > last.1);
            last = (info.color.sequence, info.depth.sequence);
        }
        session.shutdown().unwrap();
    }

    /// Shutdown twice, and shutdown after failed init, release nothing twice
    #[test]
    fn test_e2e_teardown_idempotence() {
        let backend = MockBackend::with_defaults();
        let mut session = CaptureSession::new(
            Arc::new(backend.clone()),
            config(PairingPolicy::Paired, Some(2_000)),
        );
        session.initialize().unwrap();
        session.grab().unwrap();

        session.shutdown().unwrap();
        assert!(matches!(session.shutdown(), Err(CaptureError::AlreadyShutDown)));
        drop(session);

        let probe = backend.probe();
        assert_eq!(probe.contexts_acquired(), 1);
        assert_eq!(probe.contexts_released(), 1);
        assert_eq!(probe.devices_opened(), 1);
        assert_eq!(probe.devices_closed(), 1);
        assert_eq!(probe.events_while_closed(), 0);
        assert_eq!(probe.events().last(), Some(&ProbeEvent::ContextReleased));

        let failing = MockBackend::new(MockDeviceConfig {
            fail_stream: Some(FrameKind::Depth),
            ..Default::default()
        });
        let mut session = CaptureSession::new(
            Arc::new(failing.clone()),
            config(PairingPolicy::Paired, Some(2_000)),
        );
        assert!(session.initialize().is_err());
        assert_eq!(session.state(), SessionState::Created);
        session.shutdown().unwrap();
        drop(session);

        let probe = failing.probe();
        assert_eq!(probe.devices_closed(), 1);
        assert_eq!(probe.contexts_released(), 1);
        assert_eq!(probe.streams_stopped(FrameKind::Depth), 0);
    }

    /// A reader blocked on another thread is woken by shutdown
    #[tokio::test]
    async fn test_e2e_blocked_reader_woken_by_shutdown() {
        let backend = MockBackend::new(MockDeviceConfig {
            deliver_color: false,
            deliver_depth: false,
            ..Default::default()
        });
        let mut session =
            CaptureSession::new(Arc::new(backend), config(PairingPolicy::Paired, None));
        session.initialize().unwrap();

        let reader = session.reader().unwrap();
        let pull = tokio::task::spawn_blocking(move || reader.grab());

        tokio::time::sleep(Duration::from_millis(50)).await;
        session.shutdown().unwrap();

        let result = tokio::time::timeout(Duration::from_secs(5), pull)
            .await
            .expect("reader was not woken")
            .unwrap();
        assert!(matches!(result, Err(CaptureError::SessionClosed)));
    }

    /// Config file -> backend -> session
    #[test]
    fn test_e2e_from_config_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        file.write_all(
            br#"
[device]
backend = "mock"

[pull]
pairing = "paired"
timeout_ms = 2000

[pump]
poll_timeout_ms = 10

[mock]
color_fill = 17
depth_fill = 1500
frame_interval_ms = 1
"#,
        )
        .unwrap();

        let config = config_loader::ConfigLoader::load_from_path(file.path()).unwrap();
        let backend = device::backend_for(&config).unwrap();
        let mut session = CaptureSession::new(backend, config);
        session.initialize().unwrap();

        let pair = session.grab().unwrap();
        assert_eq!(pair.color_range(), Some((17, 17)));
        assert_eq!(pair.depth_range(), Some((1500, 1500)));
        session.shutdown().unwrap();
    }

    /// Pump thread keeps delivering while the consumer is slow
    #[test]
    fn test_e2e_slow_consumer_sees_overwrites() {
        let mut session = CaptureSession::new(
            Arc::new(MockBackend::with_defaults()),
            config(PairingPolicy::Paired, Some(2_000)),
        );
        session.initialize().unwrap();

        let (mut color, mut depth) = buffers();
        session.get_frames(&mut color, &mut depth).unwrap();
        thread::sleep(Duration::from_millis(50));
        let info = session.get_frames(&mut color, &mut depth).unwrap();

        assert!(info.color.skipped > 0 || info.depth.skipped > 0);
        session.shutdown().unwrap();
    }

    /// Paired pulls aggregate as fully paired, nothing stale
    #[test]
    fn test_e2e_metrics_aggregate_paired_run() {
        let mut session = CaptureSession::new(
            Arc::new(MockBackend::with_defaults()),
            config(PairingPolicy::Paired, Some(2_000)),
        );
        session.initialize().unwrap();

        let mut aggregator = CaptureMetricsAggregator::new();
        let (mut color, mut depth) = buffers();
        for _ in 0..3 {
            let started = Instant::now();
            let info = session.get_frames(&mut color, &mut depth).unwrap();
            aggregator.update(&info, started.elapsed());
        }
        session.shutdown().unwrap();

        let summary = aggregator.summary();
        assert_eq!(summary.snapshots, 3);
        assert_eq!(summary.paired_snapshots, 3);
        assert_eq!(summary.stale_color, 0);
        assert_eq!(summary.stale_depth, 0);
        assert!((summary.paired_rate - 100.0).abs() < f64::EPSILON);
        assert_eq!(aggregator.wait_stats.count(), 3);
    }
}
