// End-to-end lifecycle scenarios against recording hardware
use flipdot_driver::service::{
    DrawRequest, GetInfoRequest, LightRequest, LightStatus, Service, StatusCode, TestAction,
    TestRequest,
};
use flipdot_driver::testing::{PanelCall, RecordingOutputs, RecordingPanelLink};
use flipdot_driver::{
    Controller, DriverConfig, DriverError, ErrorKind, HanoverLink, Image, LifecycleState,
    PanelLink, PinMapping, PowerSequencer, SignInfo, SignSpec,
};
use std::sync::{Arc, Mutex};
use std::thread;

// GPIO line numbers
const SIGN_PIN: u32 = 21;
const LIGHT_PIN: u32 = 20;

fn two_sign_config() -> DriverConfig {
    DriverConfig::new(PinMapping::new(SIGN_PIN, LIGHT_PIN))
        .add_sign(SignSpec::new("top", 1, 84, 7))
        .add_sign(SignSpec::new("bottom", 2, 84, 7))
}

fn build(config: &DriverConfig) -> (Controller, RecordingPanelLink, RecordingOutputs) {
    let outputs = RecordingOutputs::new();
    let link = RecordingPanelLink::new();
    let controller = Controller::from_config(config, Box::new(link.clone()), &outputs).unwrap();
    (controller, link, outputs)
}

#[test]
fn two_sign_scenario() {
    let (controller, link, outputs) = build(&two_sign_config());

    controller.start().unwrap();
    assert_eq!(outputs.writes(SIGN_PIN), vec![true]);

    let info = controller.signs().unwrap();
    assert_eq!(
        info,
        vec![
            SignInfo { name: "top".into(), width: 84, height: 7 },
            SignInfo { name: "bottom".into(), width: 84, height: 7 },
        ]
    );

    let bitmap: Vec<bool> = (0..84 * 7).map(|i| i % 3 == 0).collect();
    for _ in 0..5 {
        controller.draw("bottom", bitmap.clone()).unwrap();
    }

    let draws = link.draws();
    assert_eq!(draws.len(), 5);
    let (sign, image) = &draws[0];
    assert_eq!(sign, "bottom");
    assert_eq!(image.shape(), (7, 84));
    for r in 0..7 {
        for c in 0..84 {
            assert_eq!(image.get(r, c), Some(bitmap[r * 84 + c]));
        }
    }

    controller.shutdown().unwrap();
    assert_eq!(outputs.writes(SIGN_PIN), vec![true, false]);
    drop(controller);
    assert_eq!(outputs.writes(SIGN_PIN), vec![true, false]);
}

#[test]
fn draw_length_must_match_exactly() {
    let (controller, link, _) = build(&two_sign_config());
    controller.start().unwrap();

    for len in [84 * 7 - 1, 84 * 7 + 1] {
        let err = controller.draw("top", vec![true; len]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidImage);
    }
    assert!(link.draws().is_empty());

    controller.draw("top", vec![true; 84 * 7]).unwrap();
    assert_eq!(link.draws().len(), 1);
}

#[test]
fn unknown_signs_are_not_found() {
    let (controller, link, _) = build(&two_sign_config());
    controller.start().unwrap();

    for name in ["middle", "Top", ""] {
        assert_eq!(controller.sign(name).unwrap_err().kind(), ErrorKind::NotFound);
        assert_eq!(
            controller.draw(name, vec![false; 84 * 7]).unwrap_err().kind(),
            ErrorKind::NotFound
        );
    }
    assert!(link.draws().is_empty());
}

#[test]
fn light_is_independent_of_sign_rail() {
    let (controller, _, outputs) = build(&two_sign_config());

    controller.set_light(true).unwrap();
    controller.set_light(false).unwrap();

    assert_eq!(outputs.writes(LIGHT_PIN), vec![true, false]);
    assert!(outputs.writes(SIGN_PIN).is_empty());
}

#[test]
fn service_round_trip() {
    let (controller, link, outputs) = build(&two_sign_config());
    controller.start().unwrap();
    let controller = Arc::new(controller);
    let service = Service::new(Arc::clone(&controller));

    let info = service.get_info(GetInfoRequest::default()).unwrap();
    assert_eq!(info.signs.len(), 2);

    service.test(TestRequest::new(TestAction::Start)).unwrap();
    service.test(TestRequest::new(TestAction::Start)).unwrap();
    assert_eq!(controller.state(), LifecycleState::TestMode);

    let status = service.test(TestRequest { action: 7 }).unwrap_err();
    assert_eq!(status.code, StatusCode::InvalidArgument);
    assert_eq!(controller.state(), LifecycleState::TestMode);

    service.test(TestRequest::new(TestAction::Stop)).unwrap();
    service.test(TestRequest::new(TestAction::Stop)).unwrap();
    assert_eq!(controller.state(), LifecycleState::Ready);
    assert_eq!(link.count(|c| matches!(c, PanelCall::StopTest)), 1);

    let status = service
        .draw(DrawRequest { sign: "side".into(), image: vec![] })
        .unwrap_err();
    assert_eq!(status.code, StatusCode::NotFound);
    assert!(status.message.contains("side"));

    let status = service
        .draw(DrawRequest { sign: "top".into(), image: vec![true; 3] })
        .unwrap_err();
    assert_eq!(status.code, StatusCode::InvalidArgument);

    service.light(LightRequest::new(LightStatus::On)).unwrap();
    assert_eq!(outputs.writes(LIGHT_PIN), vec![true]);
}

#[test]
fn concurrent_draws_are_serialized() {
    let (controller, link, _) = build(&two_sign_config());
    controller.start().unwrap();
    let controller = Arc::new(controller);

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let controller = Arc::clone(&controller);
            thread::spawn(move || {
                let sign = if i % 2 == 0 { "top" } else { "bottom" };
                for _ in 0..10 {
                    controller.draw(sign, vec![i % 3 == 0; 84 * 7]).unwrap();
                    controller.set_light(i % 2 == 0).unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(link.draws().len(), 80);
    controller.shutdown().unwrap();
    assert_eq!(controller.state(), LifecycleState::Unpowered);
}

#[test]
fn hanover_link_writes_frames() {
    let config = DriverConfig::new(PinMapping::new(1, 2)).add_sign(SignSpec::new("top", 1, 8, 1));
    let outputs = RecordingOutputs::new();
    let port = SharedBuffer::default();
    let link = HanoverLink::new(port.clone());
    let controller = Controller::from_config(&config, Box::new(link), &outputs).unwrap();

    controller.start().unwrap();
    assert!(port.take().is_empty());

    controller.test(true).unwrap();
    assert_eq!(port.take(), vec![0x02, b'3', b'0', 0x03, b'9', b'A']);

    let mut bitmap = vec![false; 8];
    bitmap[0] = true;
    controller.draw("top", bitmap).unwrap();
    // image command to address 1, 8 data bytes, first column lit
    assert_eq!(&port.take()[..7], &[0x02, b'1', b'1', b'0', b'8', b'0', b'1']);

    controller.shutdown().unwrap();
}

#[test]
fn start_can_be_retried_after_partial_registration() {
    let outputs = RecordingOutputs::new();
    let port = SharedBuffer::default();
    let link = FailOnce {
        inner: HanoverLink::new(port.clone()),
        sign: "bottom",
        failed: false,
    };
    let power = PowerSequencer::initialize(&outputs, PinMapping::new(SIGN_PIN, LIGHT_PIN)).unwrap();
    let signs = vec![SignSpec::new("top", 1, 8, 1), SignSpec::new("bottom", 2, 8, 1)];
    let controller = Controller::new(signs, Box::new(link), power).unwrap();

    // "top" reaches the link before "bottom" fails
    let err = controller.start().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::HardwareFault);
    assert_eq!(controller.state(), LifecycleState::Unpowered);

    controller.start().unwrap();
    assert_eq!(controller.state(), LifecycleState::Ready);
    assert_eq!(outputs.writes(SIGN_PIN), vec![true, false, true]);

    controller.draw("top", vec![false; 8]).unwrap();
    controller.draw("bottom", vec![false; 8]).unwrap();
    assert_eq!(&port.take()[..3], &[0x02, b'1', b'1']);
}

/// Hanover link whose first registration of one sign fails
struct FailOnce {
    inner: HanoverLink<SharedBuffer>,
    sign: &'static str,
    failed: bool,
}

impl PanelLink for FailOnce {
    fn add_sign(&mut self, spec: &SignSpec) -> flipdot_driver::Result<SignInfo> {
        if spec.name == self.sign && !self.failed {
            self.failed = true;
            return Err(DriverError::HardwareFault("no answer from panel".into()));
        }
        self.inner.add_sign(spec)
    }

    fn draw_image(&mut self, sign: &str, image: &Image) -> flipdot_driver::Result<()> {
        self.inner.draw_image(sign, image)
    }

    fn start_test_signs(&mut self) -> flipdot_driver::Result<()> {
        self.inner.start_test_signs()
    }

    fn stop_test_signs(&mut self) -> flipdot_driver::Result<()> {
        self.inner.stop_test_signs()
    }
}

/// Cloneable in-memory port
#[derive(Clone, Default)]
struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

impl SharedBuffer {
    fn take(&self) -> Vec<u8> {
        std::mem::take(&mut *self.0.lock().unwrap())
    }
}

impl std::io::Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}
