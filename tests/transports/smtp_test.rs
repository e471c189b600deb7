//! SMTP transport tests. No server is contacted except a closed local port.

use std::time::Duration;

use bulletin::providers::SmtpTransport;
use bulletin::{RenderedMessage, SmtpConfig, Transport, TransportErrorCode};

fn message() -> RenderedMessage {
    RenderedMessage::new()
        .from("admin@school.edu")
        .to("asha@school.edu")
        .subject("Attendance alert")
        .body("<p>Attendance: 62%</p>")
}

fn closed_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

#[test]
fn builds_from_config() {
    let config = SmtpConfig {
        host: "smtp.school.edu".into(),
        port: 465,
        secure: true,
        username: Some("mailer".into()),
        password: Some("secret".into()),
    };
    assert!(SmtpTransport::from_config(&config).build().is_ok());
}

#[tokio::test]
async fn refused_connection_is_transient() {
    let transport = SmtpTransport::new("127.0.0.1", closed_port())
        .no_tls()
        .timeout(Duration::from_secs(2))
        .build()
        .unwrap();

    let err = transport.send(&message()).await.unwrap_err();

    assert_eq!(
        err.transport_code(),
        Some(&TransportErrorCode::ConnectionRefused)
    );
    assert!(err.is_transient());
}

#[tokio::test]
async fn invalid_message_never_connects() {
    let transport = SmtpTransport::localhost();
    let err = transport
        .send(&RenderedMessage::new().from("admin@school.edu").to("a@school.edu"))
        .await
        .unwrap_err();
    assert!(!err.is_transient());
}
