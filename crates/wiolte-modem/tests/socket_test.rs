//! Socket open, send, receive and close against a scripted module.

mod common;

use std::time::Duration;

use common::*;
use tokio::io::DuplexStream;
use tokio::time::Instant;
use wiolte_modem::{Modem, ModemError, SocketType, MAX_CONNECTIONS, MAX_SOCKET_DATA_SIZE};

const HOST: &str = "example.com";
const PORT: u16 = 80;

fn state_line(connect_id: u8) -> String {
    format!(
        "+QISTATE: {},\"TCP\",\"93.184.216.34\",80,40000,2,1,{},0,\"uart1\"",
        connect_id, connect_id
    )
}

/// A modem with connection 0 open, followed by `steps`.
async fn open_modem(steps: Vec<Step>) -> (Modem<DuplexStream>, Device) {
    let mut script = open_script(0, HOST, PORT);
    script.extend(steps);
    let (mut modem, device, _lines) = scripted_modem(script);
    let connect_id = modem
        .open(HOST, PORT, SocketType::Tcp, TIMEOUT)
        .await
        .expect("open");
    assert_eq!(connect_id, 0);
    (modem, device)
}

// ============================================================================
// Open
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_open_skips_ids_live_on_module() {
    let listing: Vec<String> = (0..3).map(state_line).collect();
    let mut reply: Vec<&str> = listing.iter().map(String::as_str).collect();
    reply.push("OK");
    let steps = vec![
        command("AT+QISTATE?", lines(&reply)),
        command(
            "AT+QIOPEN=1,3,\"TCP\",\"example.com\",80,0,0",
            [ok(), line("+QIOPEN: 3,0")].concat(),
        ),
    ];
    let (mut modem, device, _lines) = scripted_modem(steps);

    let connect_id = modem
        .open(HOST, PORT, SocketType::Tcp, TIMEOUT)
        .await
        .expect("open");
    assert_eq!(connect_id, 3);
    assert!(modem.is_open(3));
    assert!(!modem.is_open(0));
    device.assert_script_complete();
    device.check().await;
}

#[tokio::test(start_paused = true)]
async fn test_open_skips_locally_open_ids() {
    let state = state_line(1);
    let steps = vec![
        command("AT+QISTATE?", lines(&[state.as_str(), "OK"])),
        command(
            "AT+QIOPEN=1,2,\"UDP\",\"example.com\",80,0,0",
            [ok(), line("+QIOPEN: 2,0")].concat(),
        ),
    ];
    let (mut modem, device) = open_modem(steps).await;

    let connect_id = modem
        .open(HOST, PORT, SocketType::Udp, TIMEOUT)
        .await
        .expect("open");
    assert_eq!(connect_id, 2);
    assert_eq!(modem.pool().socket_type(2), Some(SocketType::Udp));
    assert_eq!(modem.pool().len(), 2);
    device.check().await;
}

#[tokio::test(start_paused = true)]
async fn test_open_error_code_is_a_hard_error() {
    let steps = vec![
        command("AT+QISTATE?", ok()),
        command(
            "AT+QIOPEN=1,0,\"TCP\",\"example.com\",80,0,0",
            [ok(), line("+QIOPEN: 0,565")].concat(),
        ),
    ];
    let (mut modem, device, _lines) = scripted_modem(steps);

    let err = modem
        .open(HOST, PORT, SocketType::Tcp, TIMEOUT)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ModemError::SocketOpen {
            connect_id: 0,
            code: 565
        }
    ));
    assert!(modem.pool().is_empty());
    device.check().await;
}

#[tokio::test(start_paused = true)]
async fn test_open_result_for_another_id_is_ignored() {
    let state: Vec<String> = vec![state_line(0), state_line(1), state_line(2)];
    let steps = vec![
        command(
            "AT+QISTATE?",
            lines(&[state[0].as_str(), state[1].as_str(), state[2].as_str(), "OK"]),
        ),
        command(
            "AT+QIOPEN=1,3,\"TCP\",\"example.com\",80,0,0",
            [ok(), line("+QIOPEN: 4,0"), line("+QIOPEN: 3,1")].concat(),
        ),
    ];
    let (mut modem, _device, _lines) = scripted_modem(steps);

    let err = modem
        .open(HOST, PORT, SocketType::Tcp, TIMEOUT)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ModemError::SocketOpen {
            connect_id: 3,
            code: 1
        }
    ));
}

#[tokio::test(start_paused = true)]
async fn test_open_without_result_times_out() {
    let steps = vec![
        command("AT+QISTATE?", ok()),
        command("AT+QIOPEN=1,0,\"TCP\",\"example.com\",80,0,0", ok()),
    ];
    let (mut modem, _device, _lines) = scripted_modem(steps);

    let err = modem
        .open(HOST, PORT, SocketType::Tcp, TIMEOUT)
        .await
        .unwrap_err();
    assert!(matches!(err, ModemError::Timeout { .. }));
    assert!(!modem.is_open(0));
}

#[tokio::test(start_paused = true)]
async fn test_open_rejected_command() {
    let steps = vec![
        command("AT+QISTATE?", ok()),
        command("AT+QIOPEN=1,0,\"TCP\",\"example.com\",80,0,0", error()),
    ];
    let (mut modem, _device, _lines) = scripted_modem(steps);

    let err = modem
        .open(HOST, PORT, SocketType::Tcp, TIMEOUT)
        .await
        .unwrap_err();
    assert!(matches!(err, ModemError::Protocol(_)));
}

#[tokio::test(start_paused = true)]
async fn test_thirteenth_connection_is_refused_without_open_command() {
    let mut steps = Vec::new();
    for connect_id in 0..MAX_CONNECTIONS {
        steps.extend(open_script(connect_id, HOST, PORT));
    }
    steps.push(command("AT+QISTATE?", ok()));
    let (mut modem, device, _lines) = scripted_modem(steps);

    for expected in 0..MAX_CONNECTIONS {
        let connect_id = modem
            .open(HOST, PORT, SocketType::Tcp, TIMEOUT)
            .await
            .expect("open");
        assert_eq!(connect_id, expected);
    }
    let err = modem
        .open(HOST, PORT, SocketType::Tcp, TIMEOUT)
        .await
        .unwrap_err();
    assert!(matches!(err, ModemError::ResourceExhausted { max: 12 }));
    assert_eq!(device.count("AT+QIOPEN"), usize::from(MAX_CONNECTIONS));
    device.assert_script_complete();
    device.check().await;
}

#[tokio::test(start_paused = true)]
async fn test_module_listing_every_id_exhausts_pool() {
    let listing: Vec<String> = (0..MAX_CONNECTIONS).map(state_line).collect();
    let mut reply: Vec<&str> = listing.iter().map(String::as_str).collect();
    reply.push("OK");
    let (mut modem, device, _lines) = scripted_modem(vec![command("AT+QISTATE?", lines(&reply))]);

    let err = modem
        .open(HOST, PORT, SocketType::Tcp, TIMEOUT)
        .await
        .unwrap_err();
    assert!(matches!(err, ModemError::ResourceExhausted { .. }));
    assert_eq!(device.count("AT+QIOPEN"), 0);
    device.check().await;
}

// ============================================================================
// Send
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_send_writes_payload_after_prompt() {
    let steps = vec![
        command("AT+QISEND=0,5", "> "),
        Step::Payload {
            len: 5,
            reply: line("SEND OK"),
        },
    ];
    let (mut modem, device) = open_modem(steps).await;

    assert!(modem.send(0, b"hello", TIMEOUT).await.expect("send"));
    assert!(device.written_text().ends_with("AT+QISEND=0,5\rhello"));
    device.assert_script_complete();
    device.check().await;
}

#[tokio::test(start_paused = true)]
async fn test_send_fail_is_reported() {
    let steps = vec![
        command("AT+QISEND=0,2", "> "),
        Step::Payload {
            len: 2,
            reply: line("SEND FAIL"),
        },
    ];
    let (mut modem, device) = open_modem(steps).await;

    assert!(!modem.send(0, b"hi", TIMEOUT).await.expect("send"));
    assert!(modem.is_open(0));
    device.check().await;
}

#[tokio::test(start_paused = true)]
async fn test_send_without_prompt_writes_no_payload() {
    let (mut modem, device) = open_modem(vec![command("AT+QISEND=0,2", error())]).await;

    assert!(!modem.send(0, b"hi", TIMEOUT).await.expect("send"));
    assert!(device.written_text().ends_with("AT+QISEND=0,2\r"));
}

#[tokio::test(start_paused = true)]
async fn test_send_on_dropped_connection_fails_fast() {
    let steps = vec![command(
        "AT+QISEND=0,2",
        [line("+QIURC: \"closed\",0"), error()].concat(),
    )];
    let (mut modem, device) = open_modem(steps).await;

    let started = Instant::now();
    assert!(!modem.send(0, b"hi", TIMEOUT).await.expect("send"));
    assert!(started.elapsed() < Duration::from_secs(1));
    assert!(!modem.is_open(0));
    assert!(device.written_text().ends_with("AT+QISEND=0,2\r"));
    device.check().await;
}

#[tokio::test(start_paused = true)]
async fn test_urc_before_prompt_is_queued() {
    let steps = vec![
        command(
            "AT+QISEND=0,2",
            [line("+QIURC: \"recv\",0"), b"> ".to_vec()].concat(),
        ),
        Step::Payload {
            len: 2,
            reply: line("SEND OK"),
        },
    ];
    let (mut modem, device) = open_modem(steps).await;

    assert!(modem.send(0, b"hi", TIMEOUT).await.expect("send"));
    assert_eq!(modem.pending_urcs(), 1);
    device.assert_script_complete();
    device.check().await;
}

#[tokio::test(start_paused = true)]
async fn test_send_rejects_oversized_payload() {
    let (mut modem, device) = open_modem(vec![]).await;
    let before = device.written().len();

    let data = vec![0x55u8; MAX_SOCKET_DATA_SIZE + 1];
    let err = modem.send(0, &data, TIMEOUT).await.unwrap_err();
    assert!(matches!(err, ModemError::PayloadTooLarge { len: 1461, max: 1460 }));
    assert_eq!(device.written().len(), before);

    // Closed ids are checked first.
    assert!(!modem.send(5, &data, TIMEOUT).await.expect("send"));
}

// ============================================================================
// Receive
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_receive_reads_announced_bytes() {
    let steps = vec![command(
        "AT+QIRD=0,16",
        b"\r\n+QIRD: 5\r\nhello\r\n\r\nOK\r\n".to_vec(),
    )];
    let (mut modem, device) = open_modem(steps).await;

    let mut buffer = [0u8; 16];
    let received = modem.receive(0, &mut buffer, TIMEOUT).await.expect("receive");
    assert_eq!(received, Some(5));
    assert_eq!(&buffer[..5], b"hello");
    device.check().await;
}

#[tokio::test(start_paused = true)]
async fn test_receive_payload_may_look_like_a_response() {
    let steps = vec![command(
        "AT+QIRD=0,1460",
        b"\r\n+QIRD: 6\r\n\r\nOK\r\n\r\n\r\nOK\r\n".to_vec(),
    )];
    let (mut modem, device) = open_modem(steps).await;

    let mut buffer = vec![0u8; 4096];
    let received = modem.receive(0, &mut buffer, TIMEOUT).await.expect("receive");
    assert_eq!(received, Some(6));
    assert_eq!(&buffer[..6], b"\r\nOK\r\n");
    device.check().await;
}

#[tokio::test(start_paused = true)]
async fn test_receive_nothing_waiting() {
    let steps = vec![command("AT+QIRD=0,16", b"\r\n+QIRD: 0\r\n\r\nOK\r\n".to_vec())];
    let (mut modem, device) = open_modem(steps).await;

    let mut buffer = [0u8; 16];
    assert_eq!(
        modem.receive(0, &mut buffer, TIMEOUT).await.expect("receive"),
        Some(0)
    );
    device.check().await;
}

#[tokio::test(start_paused = true)]
async fn test_receive_error_reply() {
    let (mut modem, device) = open_modem(vec![command("AT+QIRD=0,16", error())]).await;

    let mut buffer = [0u8; 16];
    assert_eq!(modem.receive(0, &mut buffer, TIMEOUT).await.expect("receive"), None);
    device.check().await;
}

#[tokio::test(start_paused = true)]
async fn test_receive_longer_than_requested_is_a_protocol_error() {
    let steps = vec![command("AT+QIRD=0,4", b"\r\n+QIRD: 8\r\n".to_vec())];
    let (mut modem, _device) = open_modem(steps).await;

    let mut buffer = [0u8; 4];
    let err = modem.receive(0, &mut buffer, TIMEOUT).await.unwrap_err();
    assert!(matches!(err, ModemError::Protocol(_)));
}

#[tokio::test(start_paused = true)]
async fn test_receive_short_payload_is_a_protocol_error() {
    let steps = vec![command("AT+QIRD=0,16", b"\r\n+QIRD: 5\r\nhel".to_vec())];
    let (mut modem, _device) = open_modem(steps).await;

    let mut buffer = [0u8; 16];
    let err = modem.receive(0, &mut buffer, TIMEOUT).await.unwrap_err();
    assert!(matches!(err, ModemError::Protocol(_)));
}

#[tokio::test(start_paused = true)]
async fn test_receive_into_empty_buffer() {
    let (mut modem, device) = open_modem(vec![]).await;
    let before = device.written().len();

    let mut buffer = [0u8; 0];
    assert_eq!(
        modem.receive(0, &mut buffer, TIMEOUT).await.expect("receive"),
        Some(0)
    );
    assert_eq!(device.written().len(), before);
}

// ============================================================================
// Close and peer notifications
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_close_twice_issues_one_close() {
    let (mut modem, device) = open_modem(vec![command("AT+QICLOSE=0", ok())]).await;

    assert!(modem.close(0, TIMEOUT).await.expect("close"));
    assert!(!modem.is_open(0));
    assert!(!modem.close(0, TIMEOUT).await.expect("second close"));
    assert_eq!(device.count("AT+QICLOSE"), 1);
    device.check().await;
}

#[tokio::test(start_paused = true)]
async fn test_close_releases_id_without_reply() {
    let (mut modem, device) = open_modem(vec![]).await;

    assert!(!modem.close(0, TIMEOUT).await.expect("close"));
    assert!(!modem.is_open(0));
    assert_eq!(device.count("AT+QICLOSE=0"), 1);
}

#[tokio::test(start_paused = true)]
async fn test_unknown_ids_touch_nothing() {
    let (mut modem, device, _lines) = scripted_modem(vec![]);
    let mut buffer = [0u8; 16];

    assert!(!modem.send(4, b"data", TIMEOUT).await.expect("send"));
    assert_eq!(modem.receive(4, &mut buffer, TIMEOUT).await.expect("receive"), None);
    assert!(!modem.close(4, TIMEOUT).await.expect("close"));
    assert!(device.written().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_peer_close_notification_shuts_the_connection() {
    let steps = vec![command(
        "AT+CSQ",
        lines(&["+QIURC: \"closed\",0", "+CSQ: 20,99", "OK"]),
    )];
    let (mut modem, device) = open_modem(steps).await;

    // The notification is captured, never returned as a response line.
    let quality = modem.signal_quality().await.expect("csq").expect("quality");
    assert_eq!(quality.rssi, 20);
    assert_eq!(modem.pending_urcs(), 1);

    let before = device.written().len();
    let mut buffer = [0u8; 16];
    assert!(!modem.send(0, b"hi", TIMEOUT).await.expect("send"));
    assert!(!modem.is_open(0));
    assert_eq!(modem.receive(0, &mut buffer, TIMEOUT).await.expect("receive"), None);
    assert!(!modem.close(0, TIMEOUT).await.expect("close"));
    assert_eq!(device.written().len(), before);
    device.check().await;
}

#[tokio::test(start_paused = true)]
async fn test_closed_id_is_reused() {
    let mut steps = vec![command("AT", [line("+QIURC: \"closed\",0"), ok()].concat())];
    steps.extend(open_script(0, HOST, PORT));
    let (mut modem, device) = open_modem(steps).await;

    assert!(modem.ping().await.expect("ping"));
    let connect_id = modem
        .open(HOST, PORT, SocketType::Tcp, TIMEOUT)
        .await
        .expect("open");
    assert_eq!(connect_id, 0);
    device.assert_script_complete();
    device.check().await;
}
