use cellular_device::loopback::{LoopbackFactory, LoopbackScript, Reply};
use cellular_device::subsystems::SubsystemKind;
use cellular_device::{CellularDevice, DeviceConfig, DeviceError, LinkId, SimState};
use std::io;
use std::sync::{Arc, Mutex};

fn link(name: &str) -> LinkId {
    LinkId::new(name).unwrap()
}

fn device_with(script: &LoopbackScript) -> CellularDevice {
    CellularDevice::new(
        DeviceConfig::default(),
        Box::new(LoopbackFactory::new(script.clone())),
    )
    .unwrap()
}

fn probes_sent(script: &LoopbackScript) -> usize {
    script.transcript().iter().filter(|line| *line == "AT").count()
}

#[cfg(test)]
mod sim_state_tests {
    use super::*;

    fn state_for(reply: Reply) -> (SimState, Result<(), DeviceError>) {
        let script = LoopbackScript::new();
        script.reply("AT+CPIN?", reply);
        let mut device = device_with(&script);
        device.sim_state()
    }

    #[test]
    fn test_ready() {
        assert_eq!(state_for(Reply::line("+CPIN: READY")), (SimState::Ready, Ok(())));
    }

    #[test]
    fn test_pin_and_puk_needed() {
        assert_eq!(state_for(Reply::line("+CPIN: SIM PIN")), (SimState::PinNeeded, Ok(())));
        assert_eq!(state_for(Reply::line("+CPIN: SIM PUK")), (SimState::PukNeeded, Ok(())));
    }

    #[test]
    fn test_unrecognised_answer_is_unknown() {
        assert_eq!(state_for(Reply::line("+CPIN: GARBAGE")), (SimState::Unknown, Ok(())));
    }

    #[test]
    fn test_missing_answer_is_unknown_without_error() {
        assert_eq!(state_for(Reply::ok()), (SimState::Unknown, Ok(())));
    }

    #[test]
    fn test_modem_error_is_unknown_with_error() {
        assert_eq!(
            state_for(Reply::error(DeviceError::Device)),
            (SimState::Unknown, Err(DeviceError::Device))
        );
    }

    #[test]
    fn test_long_answer_is_truncated_before_matching() {
        let long = "+CPIN: SIM PIN WITH A VERY LONG TRAILING EXPLANATION";
        assert_eq!(state_for(Reply::line(long)), (SimState::PinNeeded, Ok(())));
    }

    #[test]
    fn test_classification_of_raw_fields() {
        assert_eq!(SimState::from_response(Some(&b"READY"[..])), SimState::Ready);
        assert_eq!(SimState::from_response(Some(&b"SIM PIN2"[..])), SimState::PinNeeded);
        assert_eq!(SimState::from_response(Some(&b""[..])), SimState::Unknown);
        assert_eq!(SimState::from_response(None), SimState::Unknown);
    }
}

// Collects formatted log output for inspection.
#[derive(Clone, Default)]
struct LogBuffer(Arc<Mutex<Vec<u8>>>);

impl io::Write for LogBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl LogBuffer {
    fn lines_at(&self, level: &str) -> usize {
        let text = String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned();
        text.lines().filter(|line| line.contains(level)).count()
    }
}

fn logged_sim_query(reply: Reply) -> (SimState, LogBuffer) {
    let script = LoopbackScript::new();
    script.reply("AT+CPIN?", reply);
    let mut device = device_with(&script);

    let logs = LogBuffer::default();
    let writer = logs.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_ansi(false)
        .with_max_level(tracing::Level::TRACE)
        .with_writer(move || writer.clone())
        .finish();
    let (state, _) = tracing::subscriber::with_default(subscriber, || device.sim_state());
    (state, logs)
}

#[cfg(test)]
mod sim_logging_tests {
    use super::*;

    #[test]
    fn test_unrecognised_answer_reported_once() {
        let (state, logs) = logged_sim_query(Reply::line("+CPIN: GARBAGE"));

        assert_eq!(state, SimState::Unknown);
        assert_eq!(logs.lines_at("ERROR"), 1);
        assert_eq!(logs.lines_at("WARN"), 0);
    }

    #[test]
    fn test_unreadable_answer_reported_once() {
        let (state, logs) = logged_sim_query(Reply::ok());

        assert_eq!(state, SimState::Unknown);
        assert_eq!(logs.lines_at("WARN"), 1);
        assert_eq!(logs.lines_at("ERROR"), 0);
    }

    #[test]
    fn test_puk_reported_once() {
        let (state, logs) = logged_sim_query(Reply::line("+CPIN: SIM PUK"));

        assert_eq!(state, SimState::PukNeeded);
        assert_eq!(logs.lines_at("ERROR"), 1);
    }
}

#[cfg(test)]
mod set_pin_tests {
    use super::*;

    #[test]
    fn test_ready_sim_is_not_sent_a_pin() {
        let script = LoopbackScript::with_defaults();
        let mut device = device_with(&script);

        assert_eq!(device.set_pin(Some("1234")), Ok(()));
        assert_eq!(script.transcript(), vec!["AT+CPIN?"]);
    }

    #[test]
    fn test_locked_sim_receives_pin() {
        let script = LoopbackScript::new();
        script.reply("AT+CPIN?", Reply::line("+CPIN: SIM PIN"));
        let mut device = device_with(&script);

        assert_eq!(device.set_pin(Some("1234")), Ok(()));
        assert_eq!(script.transcript(), vec!["AT+CPIN?", "AT+CPIN=\"1234\""]);
    }

    #[test]
    fn test_locked_sim_without_pin_is_parameter_error() {
        let script = LoopbackScript::new();
        script.reply("AT+CPIN?", Reply::line("+CPIN: SIM PIN"));
        let mut device = device_with(&script);

        assert_eq!(device.set_pin(None), Err(DeviceError::Parameter));
        assert_eq!(script.count("AT+CPIN="), 0);
    }

    #[test]
    fn test_ready_sim_without_pin_succeeds() {
        let script = LoopbackScript::with_defaults();
        let mut device = device_with(&script);

        assert_eq!(device.set_pin(None), Ok(()));
    }

    #[test]
    fn test_rejected_pin_is_reported() {
        let script = LoopbackScript::new();
        script.reply("AT+CPIN?", Reply::line("+CPIN: SIM PIN"));
        script.reply("AT+CPIN=", Reply::error(DeviceError::Device));
        let mut device = device_with(&script);

        assert_eq!(device.set_pin(Some("0000")), Err(DeviceError::Device));
    }

    #[test]
    fn test_unreadable_sim_state_still_sends_pin() {
        let script = LoopbackScript::new();
        script.reply("AT+CPIN?", Reply::error(DeviceError::Device));
        let mut device = device_with(&script);

        assert_eq!(device.set_pin(Some("1234")), Ok(()));
        assert_eq!(script.count("AT+CPIN=\"1234\""), 1);
    }
}

#[cfg(test)]
mod readiness_tests {
    use super::*;

    #[test]
    fn test_ready_sends_two_probes() {
        let script = LoopbackScript::new();
        let mut device = device_with(&script);

        assert_eq!(device.is_ready(), Ok(()));
        assert_eq!(probes_sent(&script), 2);
    }

    #[test]
    fn test_first_probe_failure_is_ignored() {
        let script = LoopbackScript::new();
        script.reply_sequence("AT", [Reply::error(DeviceError::Device), Reply::ok()]);
        let mut device = device_with(&script);

        assert_eq!(device.is_ready(), Ok(()));
        assert_eq!(probes_sent(&script), 2);
    }

    #[test]
    fn test_second_probe_failure_is_reported() {
        let script = LoopbackScript::new();
        script.reply_sequence("AT", [Reply::ok(), Reply::error(DeviceError::Timeout)]);
        let mut device = device_with(&script);

        assert_eq!(device.is_ready(), Err(DeviceError::Timeout));
    }

    #[test]
    fn test_ready_callback_is_unsupported() {
        let script = LoopbackScript::new();
        let mut device = device_with(&script);

        assert_eq!(
            device.set_ready_callback(Box::new(|| {})),
            Err(DeviceError::Unsupported)
        );
    }
}

#[cfg(test)]
mod module_control_tests {
    use super::*;

    #[test]
    fn test_init_module_identifies_and_closes_information() {
        let script = LoopbackScript::with_defaults();
        let mut device = device_with(&script);

        assert_eq!(device.init_module(), Ok(()));

        assert_eq!(script.transcript(), vec!["AT+CGMM"]);
        assert!(!device.is_open(SubsystemKind::Information));
        assert_eq!(device.pool().ref_count(&link("uart0")), Some(1));
    }

    #[test]
    fn test_init_module_without_identification_sends_nothing() {
        let script = LoopbackScript::with_defaults();
        let config = DeviceConfig {
            identify_on_init: false,
            ..DeviceConfig::default()
        };
        let mut device =
            CellularDevice::new(config, Box::new(LoopbackFactory::new(script.clone()))).unwrap();

        assert_eq!(device.init_module(), Ok(()));
        assert!(script.transcript().is_empty());
    }

    #[test]
    fn test_init_module_tolerates_failed_identification() {
        let script = LoopbackScript::new();
        script.reply("AT+CGMM", Reply::error(DeviceError::Device));
        let mut device = device_with(&script);

        assert_eq!(device.init_module(), Ok(()));
    }

    #[test]
    fn test_timeout_and_debug_reach_every_channel() {
        let script = LoopbackScript::new();
        let mut device = device_with(&script);
        device.open_network(Some(&link("uart1"))).unwrap();

        device.set_timeout(8000);
        device.modem_debug_on(true);

        for name in ["uart0", "uart1"] {
            let settings = script.settings(&link(name)).unwrap();
            assert_eq!(settings.timeout_ms, 8000);
            assert!(settings.debug);
        }
        assert_eq!(device.config().default_timeout_ms, 8000);
        assert!(device.config().modem_debug);

        device.open_sms(Some(&link("uart2"))).unwrap();
        let settings = script.settings(&link("uart2")).unwrap();
        assert_eq!(settings.timeout_ms, 8000);
        assert!(settings.debug);
    }
}
