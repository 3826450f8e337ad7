use cellular_device::loopback::{LoopbackFactory, LoopbackScript};
use cellular_device::subsystems::SubsystemKind;
use cellular_device::{CellularDevice, ContextId, DeviceConfig, DeviceError, LinkId};

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

fn ids(device: &CellularDevice) -> Vec<ContextId> {
    device.contexts().iter().map(|context| context.id()).collect()
}

#[cfg(test)]
mod ordering_tests {
    use super::*;

    #[test]
    fn test_contexts_listed_in_creation_order() {
        let script = LoopbackScript::new();
        let mut device = device_with(&script);

        let first = device.create_context(None, Some("internet")).unwrap();
        let second = device.create_context(None, None).unwrap();
        let third = device.create_context(Some(&link("uart1")), Some("iot")).unwrap();

        assert_eq!(ids(&device), vec![first, second, third]);
        assert_eq!(device.ref_count(SubsystemKind::Context), 3);
        assert!(device.is_open(SubsystemKind::Context));
    }

    #[test]
    fn test_deleting_middle_context_keeps_order() {
        let script = LoopbackScript::new();
        let mut device = device_with(&script);

        let created: Vec<ContextId> = (0..5)
            .map(|_| device.create_context(None, None).unwrap())
            .collect();

        assert!(device.delete_context(created[2]));

        assert_eq!(
            ids(&device),
            vec![created[0], created[1], created[3], created[4]]
        );
    }

    #[test]
    fn test_deleting_head_context() {
        let script = LoopbackScript::new();
        let mut device = device_with(&script);

        let first = device.create_context(None, None).unwrap();
        let second = device.create_context(None, None).unwrap();

        assert!(device.delete_context(first));
        assert_eq!(ids(&device), vec![second]);
        assert_eq!(device.context_count(), 1);

        assert!(device.delete_context(second));
        assert!(device.contexts().is_empty());
        assert!(!device.is_open(SubsystemKind::Context));
    }

    #[test]
    fn test_deleting_unknown_context_changes_nothing() {
        let script = LoopbackScript::new();
        let mut device = device_with(&script);
        let only = device.create_context(None, None).unwrap();

        assert!(!device.delete_context(ContextId::new(999)));
        assert!(device.delete_context(only));
        assert!(!device.delete_context(only));
        assert_eq!(device.pool().ref_count(&link("uart0")), Some(1));
    }

    #[test]
    fn test_context_ids_are_unique() {
        let script = LoopbackScript::new();
        let mut device = device_with(&script);

        let first = device.create_context(None, None).unwrap();
        device.delete_context(first);
        let second = device.create_context(None, None).unwrap();

        assert_ne!(first, second);
        assert!(device.context(first).is_none());
        assert_eq!(device.context(second).unwrap().id(), second);
    }
}

#[cfg(test)]
mod channel_binding_tests {
    use super::*;

    #[test]
    fn test_each_context_holds_its_link() {
        let script = LoopbackScript::new();
        let mut device = device_with(&script);
        let uart0 = link("uart0");
        let uart1 = link("uart1");

        let on_default = device.create_context(None, None).unwrap();
        let on_uart1 = device.create_context(Some(&uart1), None).unwrap();
        assert_eq!(device.pool().ref_count(&uart0), Some(2));
        assert_eq!(device.pool().ref_count(&uart1), Some(1));
        assert_eq!(device.context(on_uart1).unwrap().channel().link(), &uart1);

        assert!(device.delete_context(on_uart1));
        assert!(!device.pool().contains(&uart1));
        assert_eq!(script.channels_alive(), 1);

        assert!(device.delete_context(on_default));
        assert_eq!(device.pool().ref_count(&uart0), Some(1));
    }

    #[test]
    fn test_oversized_apn_rejected_without_leaking_channel() {
        let script = LoopbackScript::new();
        let mut device = device_with(&script);
        let uart1 = link("uart1");
        let apn = "a".repeat(100);

        let result = device.create_context(Some(&uart1), Some(&apn));

        assert_eq!(result, Err(DeviceError::Parameter));
        assert!(device.contexts().is_empty());
        assert!(!device.pool().contains(&uart1));
        assert_eq!(script.channels_alive(), 1);
    }

    #[test]
    fn test_unavailable_link_fails_context_creation() {
        let script = LoopbackScript::new();
        let mut device = device_with(&script);
        let dead = link("uart7");
        script.make_unavailable(dead);

        assert_eq!(
            device.create_context(Some(&dead), None),
            Err(DeviceError::NoConnection)
        );
        assert!(device.contexts().is_empty());
    }
}

#[cfg(test)]
mod define_tests {
    use super::*;

    #[test]
    fn test_define_sends_cgdcont_with_apn() {
        let script = LoopbackScript::new();
        let mut device = device_with(&script);

        let id = device.create_context(None, Some("internet")).unwrap();
        let context = device.context_mut(id).unwrap();
        assert_eq!(context.apn(), Some("internet"));
        context.define().unwrap();

        assert_eq!(
            script.transcript(),
            vec![format!("AT+CGDCONT={},\"IP\",\"internet\"", id.get())]
        );
    }

    #[test]
    fn test_define_without_apn_omits_it() {
        let script = LoopbackScript::new();
        let mut device = device_with(&script);

        let id = device.create_context(None, None).unwrap();
        device.context_mut(id).unwrap().define().unwrap();

        assert_eq!(
            script.transcript(),
            vec![format!("AT+CGDCONT={},\"IP\"", id.get())]
        );
    }
}
