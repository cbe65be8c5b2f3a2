//! Integration tests: full exchanges against a minimal HTTP responder on
//! localhost, plus randomized admission checks against a gated transport.

use std::collections::VecDeque;
use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use bytes::Bytes;
use frameswap_core::exchange::transport::{ExchangeRequest, TransportReply};
use frameswap_core::{
    Capture, ChannelLayout, Completion, EndpointConfig, ExchangeController, ExchangeError,
    ExchangeSettings, FrameSource, HttpTransport, OutputSink, OutputTarget, ScalarFrame,
    SourceFrame, Transport, TransportError, WireEncoding,
};
use image::{ImageFormat, Rgba, RgbaImage};
use proptest::prelude::*;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{Notify, mpsc};

// ── Helpers ──────────────────────────────────────────────────────

/// One request as seen by the responder.
#[derive(Debug)]
struct Recorded {
    request_line: String,
    headers: Vec<(String, String)>,
    body: Vec<u8>,
}

impl Recorded {
    fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// A scripted response, optionally held back until `gate` is notified.
struct Canned {
    status: u16,
    content_type: &'static str,
    body: Vec<u8>,
    gate: Option<Arc<Notify>>,
}

impl Canned {
    fn image(w: u32, h: u32, px: [u8; 4]) -> Self {
        Self {
            status: 200,
            content_type: "application/json",
            body: image_reply(w, h, px).into_bytes(),
            gate: None,
        }
    }

    fn status(status: u16) -> Self {
        Self {
            status,
            content_type: "text/plain",
            body: b"boom".to_vec(),
            gate: None,
        }
    }

    fn gated(mut self, gate: &Arc<Notify>) -> Self {
        self.gate = Some(Arc::clone(gate));
        self
    }
}

fn image_reply(w: u32, h: u32, px: [u8; 4]) -> String {
    let mut png = Vec::new();
    RgbaImage::from_pixel(w, h, Rgba(px))
        .write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
        .unwrap();
    serde_json::json!({ "image": STANDARD.encode(png) }).to_string()
}

/// Serve `script` one response per connection on an OS-assigned port.
async fn spawn_responder(script: Vec<Canned>) -> (EndpointConfig, mpsc::UnboundedReceiver<Recorded>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        for canned in script {
            let Ok((mut stream, _)) = listener.accept().await else {
                return;
            };
            let recorded = read_request(&mut stream).await;
            let _ = tx.send(recorded);
            if let Some(gate) = &canned.gate {
                gate.notified().await;
            }
            let reason = if canned.status == 200 { "OK" } else { "Error" };
            let head = format!(
                "HTTP/1.1 {} {reason}\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                canned.status,
                canned.content_type,
                canned.body.len()
            );
            let _ = stream.write_all(head.as_bytes()).await;
            let _ = stream.write_all(&canned.body).await;
            let _ = stream.shutdown().await;
        }
    });

    let endpoint = EndpointConfig {
        host: addr.ip().to_string(),
        port: addr.port().to_string(),
        path: "/sandbox/".into(),
    };
    (endpoint, rx)
}

async fn read_request(stream: &mut TcpStream) -> Recorded {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    let header_end = loop {
        let n = stream.read(&mut chunk).await.unwrap();
        assert!(n > 0, "client closed before sending headers");
        buf.extend_from_slice(&chunk[..n]);
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
    };

    let head = String::from_utf8_lossy(&buf[..header_end]).into_owned();
    let mut lines = head.split("\r\n");
    let request_line = lines.next().unwrap_or_default().to_string();
    let headers: Vec<(String, String)> = lines
        .filter_map(|line| line.split_once(':'))
        .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
        .collect();
    let content_length = headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case("content-length"))
        .and_then(|(_, v)| v.parse::<usize>().ok())
        .unwrap_or(0);

    let mut body = buf[header_end..].to_vec();
    while body.len() < content_length {
        let n = stream.read(&mut chunk).await.unwrap();
        if n == 0 {
            break;
        }
        body.extend_from_slice(&chunk[..n]);
    }

    Recorded {
        request_line,
        headers,
        body,
    }
}

struct FixedSource(ScalarFrame);

impl FrameSource for FixedSource {
    fn current_source_frame(&mut self) -> Option<SourceFrame> {
        Some(SourceFrame {
            layout: ChannelLayout::R16Float,
            frame: self.0.clone(),
        })
    }
}

#[derive(Default)]
struct CountingSink {
    published: usize,
    cleared: usize,
}

impl OutputSink for CountingSink {
    fn set_output(&mut self, _name: &str, target: &OutputTarget) {
        assert!(target.is_allocated());
        self.published += 1;
    }

    fn clear_output(&mut self, _name: &str) {
        self.cleared += 1;
    }
}

fn http_controller(encoding: WireEncoding) -> ExchangeController {
    let transport = HttpTransport::with_timeout(Duration::from_secs(5)).unwrap();
    let settings = ExchangeSettings {
        encoding,
        ..Default::default()
    };
    ExchangeController::new(Arc::new(transport), settings)
}

async fn await_reply(ctl: &mut ExchangeController) {
    tokio::time::timeout(Duration::from_secs(5), ctl.reply_ready())
        .await
        .expect("timeout waiting for reply");
}

fn ramp(w: u32, h: u32) -> ScalarFrame {
    let data = (0..w * h).map(|i| i as f32 * 0.5).collect();
    ScalarFrame::new(w, h, data).unwrap()
}

// ── End-to-end over HTTP ─────────────────────────────────────────

#[tokio::test]
async fn test_json_exchange_applies_red_image() {
    let (endpoint, mut requests) = spawn_responder(vec![Canned::image(2, 2, [255, 0, 0, 255])]).await;
    let mut ctl = http_controller(WireEncoding::Json);
    ctl.start(&endpoint).unwrap();
    let mut source = FixedSource(ramp(2, 2));
    let mut sink = CountingSink::default();

    let report = ctl.tick(&mut source, &mut sink).unwrap();
    assert!(matches!(report.capture, Some(Capture::Submitted { sequence: 0, .. })));

    let req = requests.recv().await.unwrap();
    assert_eq!(req.request_line, "POST /sandbox HTTP/1.1");
    assert_eq!(req.header("content-type"), Some("application/json"));
    let sent: serde_json::Value = serde_json::from_slice(&req.body).unwrap();
    assert_eq!(sent["width"], 2);
    assert_eq!(sent["height"], 2);
    assert_eq!(sent["data"], serde_json::json!([0.0, 0.5, 1.0, 1.5]));

    await_reply(&mut ctl).await;
    assert!(ctl.frame_received());
    let report = ctl.tick(&mut source, &mut sink).unwrap();
    assert_eq!(
        report.completion,
        Some(Completion::Applied { sequence: 0, width: 2, height: 2 })
    );
    let target = ctl.target();
    assert_eq!(target.dimensions(), Some((2, 2)));
    assert!(target.pixels().chunks(4).all(|px| px == [255, 0, 0, 255]));
    assert_eq!(sink.published, 1);
}

#[tokio::test]
async fn test_reply_arriving_before_stop_is_discarded() {
    let (endpoint, _requests) = spawn_responder(vec![
        Canned::image(2, 2, [255, 0, 0, 255]),
        Canned::image(2, 2, [0, 255, 0, 255]),
    ])
    .await;
    let mut ctl = http_controller(WireEncoding::Json);
    ctl.start(&endpoint).unwrap();
    let mut source = FixedSource(ramp(2, 2));
    let mut sink = CountingSink::default();

    ctl.tick(&mut source, &mut sink).unwrap();
    await_reply(&mut ctl).await;
    ctl.stop(&mut sink);
    assert!(!ctl.frame_received());
    ctl.start(&endpoint).unwrap();

    let report = ctl.tick(&mut source, &mut sink).unwrap();
    assert_eq!(report.completion, Some(Completion::Discarded { sequence: 0 }));
    assert!(matches!(report.capture, Some(Capture::Submitted { sequence: 1, .. })));
    assert!(!ctl.target().is_allocated());
    assert_eq!(sink.published, 0);
}

#[tokio::test]
async fn test_binary_exchange_sends_raw_floats_with_query() {
    let (endpoint, mut requests) = spawn_responder(vec![Canned::image(1, 1, [0, 0, 0, 255])]).await;
    let mut ctl = http_controller(WireEncoding::Binary);
    ctl.start(&endpoint).unwrap();
    let frame = ramp(3, 2);
    let mut source = FixedSource(frame.clone());
    let mut sink = CountingSink::default();

    let report = ctl.tick(&mut source, &mut sink).unwrap();
    assert_eq!(report.capture, Some(Capture::Submitted { sequence: 0, bytes: 24 }));

    let req = requests.recv().await.unwrap();
    assert_eq!(req.request_line, "POST /sandbox?width=3&height=2 HTTP/1.1");
    assert_eq!(req.header("content-type"), Some("application/octet-stream"));
    let floats: Vec<f32> = req
        .body
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect();
    assert_eq!(floats, frame.data);
}

#[tokio::test]
async fn test_server_error_keeps_previous_image() {
    let (endpoint, _requests) = spawn_responder(vec![
        Canned::image(2, 2, [0, 0, 255, 255]),
        Canned::status(500),
    ])
    .await;
    let mut ctl = http_controller(WireEncoding::Json);
    ctl.start(&endpoint).unwrap();
    let mut source = FixedSource(ramp(2, 2));
    let mut sink = CountingSink::default();

    ctl.tick(&mut source, &mut sink).unwrap();
    await_reply(&mut ctl).await;
    ctl.tick(&mut source, &mut sink).unwrap();
    let generation = ctl.target().generation();

    await_reply(&mut ctl).await;
    let report = ctl.tick(&mut source, &mut sink).unwrap();
    assert_eq!(
        report.completion,
        Some(Completion::Dropped {
            sequence: 1,
            error: ExchangeError::Protocol { status: 500 },
        })
    );
    assert_eq!(ctl.target().generation(), generation);
    assert!(ctl.target().pixels().chunks(4).all(|px| px == [0, 0, 255, 255]));
    assert!(ctl.is_running());
}

#[tokio::test]
async fn test_unreachable_service_drops_frame() {
    let port = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };
    let mut ctl = http_controller(WireEncoding::Json);
    ctl.start(&EndpointConfig {
        host: "127.0.0.1".into(),
        port: port.to_string(),
        path: "sandbox".into(),
    })
    .unwrap();
    let mut source = FixedSource(ramp(2, 2));
    let mut sink = CountingSink::default();

    ctl.tick(&mut source, &mut sink).unwrap();
    await_reply(&mut ctl).await;
    let report = ctl.tick(&mut source, &mut sink).unwrap();
    assert!(matches!(
        report.completion,
        Some(Completion::Dropped { error: ExchangeError::Connection(_), .. })
    ));
    assert!(!ctl.target().is_allocated());
}

#[tokio::test]
async fn test_stop_during_await_discards_late_reply() {
    let gate = Arc::new(Notify::new());
    let (endpoint, mut requests) = spawn_responder(vec![
        Canned::image(2, 2, [9, 9, 9, 255]),
        Canned::image(8, 8, [1, 1, 1, 255]).gated(&gate),
    ])
    .await;
    let mut ctl = http_controller(WireEncoding::Json);
    ctl.start(&endpoint).unwrap();
    let mut source = FixedSource(ramp(2, 2));
    let mut sink = CountingSink::default();

    ctl.tick(&mut source, &mut sink).unwrap();
    await_reply(&mut ctl).await;
    ctl.tick(&mut source, &mut sink).unwrap();
    assert!(ctl.target().is_allocated());

    // Second request is held by the responder.
    requests.recv().await.unwrap();
    requests.recv().await.unwrap();
    assert!(ctl.phase().is_awaiting_reply());

    ctl.stop(&mut sink);
    assert!(!ctl.target().is_allocated());
    assert_eq!(sink.cleared, 1);

    gate.notify_one();
    await_reply(&mut ctl).await;
    let report = ctl.tick(&mut source, &mut sink).unwrap();
    assert_eq!(report.completion, Some(Completion::Discarded { sequence: 1 }));
    assert!(!ctl.target().is_allocated());
    assert_eq!(sink.published, 1);
    assert!(!ctl.has_outstanding());
}

// ── Admission ────────────────────────────────────────────────────

/// Holds every submission until released; tracks concurrent submissions.
#[derive(Default)]
struct GatedTransport {
    gate: Notify,
    outcomes: Mutex<VecDeque<bool>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    submissions: AtomicUsize,
}

impl GatedTransport {
    fn release(&self, ok: bool) {
        self.outcomes.lock().unwrap().push_back(ok);
        self.gate.notify_one();
    }
}

#[async_trait]
impl Transport for GatedTransport {
    async fn submit(&self, _request: ExchangeRequest) -> Result<TransportReply, TransportError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        self.submissions.fetch_add(1, Ordering::SeqCst);

        self.gate.notified().await;
        let ok = self.outcomes.lock().unwrap().pop_front().unwrap_or(true);
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if ok {
            Ok(TransportReply {
                content_type: Some("application/json".into()),
                body: Bytes::from(image_reply(2, 2, [7, 7, 7, 255])),
            })
        } else {
            Err(TransportError::Protocol { status: 503 })
        }
    }
}

#[derive(Debug, Clone)]
enum Op {
    Tick,
    Deliver(bool),
    Stop,
    Start,
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        4 => Just(Op::Tick),
        3 => any::<bool>().prop_map(Op::Deliver),
        1 => Just(Op::Stop),
        1 => Just(Op::Start),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn test_at_most_one_request_in_flight(ops in prop::collection::vec(op(), 1..80)) {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        rt.block_on(async {
            let transport = Arc::new(GatedTransport::default());
            let mut ctl = ExchangeController::new(transport.clone(), ExchangeSettings::default());
            ctl.start(&EndpointConfig::default()).unwrap();
            let mut source = FixedSource(ramp(2, 2));
            let mut sink = CountingSink::default();

            for op in ops {
                match op {
                    Op::Tick => {
                        let outstanding_before = ctl.has_outstanding();
                        let report = ctl.tick(&mut source, &mut sink).unwrap();
                        // A new request goes out only when none was
                        // outstanding or this tick resolved it.
                        if matches!(report.capture, Some(Capture::Submitted { .. })) {
                            assert!(!outstanding_before || report.completion.is_some());
                        }
                    }
                    Op::Deliver(ok) => {
                        if ctl.has_outstanding() {
                            transport.release(ok);
                            await_reply(&mut ctl).await;
                        }
                    }
                    Op::Stop => ctl.stop(&mut sink),
                    Op::Start => ctl.start(&EndpointConfig::default()).unwrap(),
                }

                tokio::task::yield_now().await;
                assert!(transport.in_flight.load(Ordering::SeqCst) <= 1);
                assert!(transport.max_in_flight.load(Ordering::SeqCst) <= 1);
                if ctl.phase().is_awaiting_reply() {
                    assert!(ctl.has_outstanding());
                }
                if !ctl.is_running() {
                    assert!(ctl.phase().is_idle());
                    assert!(!ctl.target().is_allocated());
                }

                // Every submission is either resolved exactly once or is
                // the one still outstanding.
                let stats = ctl.stats();
                let resolved = stats.applied + stats.dropped + stats.discarded;
                assert_eq!(stats.submitted, resolved + u64::from(ctl.has_outstanding()));
            }

            let submitted = ctl.stats().submitted;
            assert!(transport.submissions.load(Ordering::SeqCst) as u64 <= submitted);
        });
    }
}
