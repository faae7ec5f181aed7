//! Power-on, handshake and registration against a scripted module.

mod common;

use std::time::Duration;

use common::*;
use wiolte_modem::{Modem, ModemConfig, ModemError, ModemState, RegistrationDomain};

// ============================================================================
// Boot and handshake
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_reset_path_consumes_five_replies_in_order() {
    let (mut modem, device, lines) = scripted_modem(boot_script());

    assert!(modem.turn_on_or_reset().await.expect("boot"));
    assert_eq!(modem.state(), ModemState::Registering);
    device.assert_script_complete();
    assert_eq!(
        device.written_text(),
        "ATE0\rAT+QURCCFG=\"urcport\",\"uart1\"\rAT+QSCLK=1\rAT+CPIN?\r"
    );
    // Low pulse, then released.
    assert_eq!(lines.reset.history(), vec![false, true]);
    assert!(lines.power_key.history().is_empty());
    device.check().await;
}

#[tokio::test(start_paused = true)]
async fn test_reset_discards_stale_bytes() {
    let mut steps = vec![emit([line("RDY"), lines(&["+QIURC: \"closed\",0", "OK"])].concat())];
    steps.extend(boot_script());
    let (mut modem, device, _lines) = scripted_modem(steps);

    assert!(modem.turn_on_or_reset().await.expect("boot"));
    assert_eq!(modem.pending_urcs(), 0);
    device.assert_script_complete();
    device.check().await;
}

#[tokio::test(start_paused = true)]
async fn test_power_key_path_when_busy() {
    let (host, device) = spawn_device(vec![
        emit(line("RDY")),
        command("ATE0", ok()),
        command("AT+QURCCFG=\"urcport\",\"uart1\"", ok()),
        command("AT+QSCLK=1", ok()),
        command("AT+CPIN?", ok()),
    ]);
    // Busy when sampled before the press and once after it, then idle.
    let (lines, test) = control_lines(SequenceInput::new(&[true, true, false]));
    let mut modem = Modem::new(host, lines, ModemConfig::default());

    assert!(modem.turn_on_or_reset().await.expect("boot"));
    assert_eq!(test.power_key.history(), vec![true, false]);
    assert!(test.reset.history().is_empty());
    device.assert_script_complete();
    device.check().await;
}

#[tokio::test(start_paused = true)]
async fn test_power_key_path_gives_up_when_always_busy() {
    let (host, device) = spawn_device(vec![]);
    let (lines, _test) = control_lines(SequenceInput::new(&[true]));
    let mut modem = Modem::new(host, lines, ModemConfig::default());

    assert!(!modem.turn_on_or_reset().await.expect("boot"));
    assert_eq!(modem.state(), ModemState::Off);
    assert!(device.written().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_error_at_any_handshake_step_aborts_before_sim_poll() {
    let handshake = [
        "ATE0",
        "AT+QURCCFG=\"urcport\",\"uart1\"",
        "AT+QSCLK=1",
    ];
    for failing in 0..handshake.len() {
        let mut steps = vec![Step::Delay(Duration::from_millis(250)), emit(line("RDY"))];
        for (index, text) in handshake.iter().enumerate().take(failing + 1) {
            let reply = if index == failing { error() } else { ok() };
            steps.push(command(text, reply));
        }
        let (mut modem, device, _lines) = scripted_modem(steps);

        assert!(
            !modem.turn_on_or_reset().await.expect("boot"),
            "step {} should abort",
            failing
        );
        assert_eq!(modem.state(), ModemState::Off);
        assert_eq!(device.count("AT+CPIN?"), 0, "step {}", failing);
        device.assert_script_complete();
        device.check().await;
    }
}

#[tokio::test(start_paused = true)]
async fn test_cme_error_aborts_handshake() {
    let steps = vec![
        Step::Delay(Duration::from_millis(250)),
        emit(line("RDY")),
        command("ATE0", line("+CME ERROR: 100")),
    ];
    let (mut modem, device, _lines) = scripted_modem(steps);
    assert!(!modem.turn_on_or_reset().await.expect("boot"));
    assert_eq!(device.count("AT+QURCCFG"), 0);
}

#[tokio::test(start_paused = true)]
async fn test_sim_poll_retries_until_ready() {
    let mut steps = boot_script();
    steps.pop();
    steps.push(command("AT+CPIN?", line("+CME ERROR: 10")));
    steps.push(command("AT+CPIN?", line("+CME ERROR: 14")));
    steps.push(command("AT+CPIN?", lines(&["+CPIN: READY", "OK"])));
    let (mut modem, device, _lines) = scripted_modem(steps);

    assert!(modem.turn_on_or_reset().await.expect("boot"));
    assert_eq!(device.count("AT+CPIN?"), 3);
    device.assert_script_complete();
    device.check().await;
}

#[tokio::test(start_paused = true)]
async fn test_sim_poll_fails_when_module_is_silent() {
    let mut steps = boot_script();
    steps.pop();
    let (mut modem, device, _lines) = scripted_modem(steps);

    assert!(!modem.turn_on_or_reset().await.expect("boot"));
    assert_eq!(modem.state(), ModemState::Off);
    assert_eq!(device.count("AT+CPIN?"), 1);
}

#[tokio::test(start_paused = true)]
async fn test_no_ready_line_fails_boot() {
    let (mut modem, device, _lines) = scripted_modem(vec![]);

    assert!(!modem.turn_on_or_reset().await.expect("boot"));
    assert_eq!(modem.state(), ModemState::Off);
    assert!(device.written().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_urcs_do_not_disturb_handshake() {
    let steps = vec![
        Step::Delay(Duration::from_millis(250)),
        emit(line("RDY")),
        command("ATE0", [line("+QIURC: \"pdpdeact\",1"), ok()].concat()),
        command("AT+QURCCFG=\"urcport\",\"uart1\"", ok()),
        command("AT+QSCLK=1", ok()),
        command("AT+CPIN?", ok()),
    ];
    let (mut modem, device, _lines) = scripted_modem(steps);

    assert!(modem.turn_on_or_reset().await.expect("boot"));
    assert_eq!(modem.pending_urcs(), 1);
    device.check().await;
}

// ============================================================================
// Power and initialization
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_supply_power() {
    let (mut modem, device, lines) = scripted_modem(vec![]);

    modem.supply_power(true).expect("power on");
    assert!(lines.module_power.level());
    assert!(modem.is_powered());

    modem.supply_power(false).expect("power off");
    assert!(!lines.module_power.level());
    assert_eq!(modem.state(), ModemState::Off);
    assert!(device.written().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_initialize_sets_idle_levels() {
    let (mut modem, device, lines) = scripted_modem(vec![emit(line("garbage"))]);
    tokio::time::sleep(Duration::from_millis(10)).await;

    modem.initialize().await.expect("initialize");
    assert_eq!(lines.reset.history(), vec![true]);
    assert!(!lines.module_power.level());
    assert_eq!(modem.state(), ModemState::Off);
    assert!(device.written().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_ping() {
    let (mut modem, device, _lines) = scripted_modem(vec![command("AT", ok())]);
    assert!(modem.ping().await.expect("ping"));
    assert!(!modem.ping().await.expect("ping"));
    device.check().await;
}

// ============================================================================
// Registration and activation
// ============================================================================

fn activation_tail() -> Vec<Step> {
    vec![
        command("AT+QICSGP=1,1,\"soracom.io\",\"sora\",\"sora\",1", ok()),
        command("AT+QIACT=1", ok()),
    ]
}

#[tokio::test(start_paused = true)]
async fn test_activate_polls_until_registered() {
    let mut steps = vec![
        command("AT+CGREG?", lines(&["+CGREG: 0,2", "OK"])),
        command("AT+CEREG?", lines(&["+CEREG: 0,3", "OK"])),
        command("AT+CGREG?", lines(&["+CGREG: 0,2", "OK"])),
        command("AT+CEREG?", lines(&["+CEREG: 0,5", "OK"])),
    ];
    steps.extend(activation_tail());
    let (mut modem, device, _lines) = scripted_modem(steps);

    let activated = modem
        .activate("soracom.io", "sora", "sora", TIMEOUT)
        .await
        .expect("activate");
    assert!(activated);
    assert_eq!(modem.state(), ModemState::Activated);
    device.assert_script_complete();
    device.check().await;
}

#[tokio::test(start_paused = true)]
async fn test_activate_registered_on_gprs_skips_eps() {
    let mut steps = vec![command("AT+CGREG?", lines(&["+CGREG: 0,1", "OK"]))];
    steps.extend(activation_tail());
    let (mut modem, device, _lines) = scripted_modem(steps);

    assert!(modem
        .activate("soracom.io", "sora", "sora", TIMEOUT)
        .await
        .expect("activate"));
    assert_eq!(device.count("AT+CEREG?"), 0);
    device.check().await;
}

#[tokio::test(start_paused = true)]
async fn test_activate_not_searching_is_denied() {
    let steps = vec![command("AT+CGREG?", lines(&["+CGREG: 0,0", "OK"]))];
    let (mut modem, device, _lines) = scripted_modem(steps);

    let err = modem
        .activate("soracom.io", "sora", "sora", TIMEOUT)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ModemError::RegistrationDenied {
            domain: RegistrationDomain::Gprs,
            status: 0
        }
    ));
    assert_eq!(device.count("AT+QICSGP"), 0);
}

#[tokio::test(start_paused = true)]
async fn test_activate_unknown_eps_is_denied() {
    let steps = vec![
        command("AT+CGREG?", lines(&["+CGREG: 0,2", "OK"])),
        command("AT+CEREG?", lines(&["+CEREG: 0,4", "OK"])),
    ];
    let (mut modem, _device, _lines) = scripted_modem(steps);

    let err = modem
        .activate("soracom.io", "sora", "sora", TIMEOUT)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ModemError::RegistrationDenied {
            domain: RegistrationDomain::Eps,
            status: 4
        }
    ));
}

#[tokio::test(start_paused = true)]
async fn test_activate_context_failure() {
    let steps = vec![
        command("AT+CGREG?", lines(&["+CGREG: 0,1", "OK"])),
        command("AT+QICSGP=1,1,\"soracom.io\",\"sora\",\"sora\",1", ok()),
        command("AT+QIACT=1", error()),
    ];
    let (mut modem, device, _lines) = scripted_modem(steps);

    assert!(!modem
        .activate("soracom.io", "sora", "sora", TIMEOUT)
        .await
        .expect("activate"));
    assert_ne!(modem.state(), ModemState::Activated);
    device.check().await;
}

#[tokio::test(start_paused = true)]
async fn test_activate_without_registration_reply_is_an_error() {
    let (mut modem, _device, _lines) = scripted_modem(vec![]);
    let err = modem
        .activate("soracom.io", "sora", "sora", TIMEOUT)
        .await
        .unwrap_err();
    assert!(matches!(err, ModemError::Protocol(_)));
}

#[tokio::test(start_paused = true)]
async fn test_context_deactivation_drops_back_to_registering() {
    let mut steps = vec![command("AT+CGREG?", lines(&["+CGREG: 0,1", "OK"]))];
    steps.extend(activation_tail());
    steps.push(command("AT", [line("+QIURC: \"pdpdeact\",1"), ok()].concat()));
    steps.push(command("AT", ok()));
    let (mut modem, device, _lines) = scripted_modem(steps);

    assert!(modem
        .activate("soracom.io", "sora", "sora", TIMEOUT)
        .await
        .expect("activate"));
    assert!(modem.ping().await.expect("ping"));
    assert_eq!(modem.state(), ModemState::Activated);
    assert!(modem.ping().await.expect("ping"));
    assert_eq!(modem.state(), ModemState::Registering);
    device.check().await;
}
