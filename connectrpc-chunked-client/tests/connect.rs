mod common;

use std::time::Duration;

use common::*;
use connectrpc_chunked_client::{
    CallOptions, ClientError, Code, Envelope, HostError, Transport, TransportBuilder,
    envelope_flags,
};
use futures::{StreamExt, stream};
use http::Method;

const BASE_URL: &str = "https://api.example.com";
const PROCEDURE: &str = "echo.v1.EchoService/Echo";

fn end_stream(json: &'static str) -> Envelope {
    Envelope::new(envelope_flags::END_STREAM, json)
}

fn stream_script(frames: &[Envelope], chunk_size: usize) -> Vec<HostEvent> {
    let mut script = vec![HostEvent::Headers(
        200,
        headers(&[("content-type", "application/connect+json")]),
    )];
    script.extend(chunked(&body(frames), chunk_size));
    script.push(HostEvent::Success);
    script
}

#[tokio::test]
async fn server_stream_messages_then_trailer() {
    let frames = [
        json_frame("A"),
        json_frame("B"),
        end_stream(r#"{"metadata":{"x":["1"]}}"#),
    ];

    for (chunked_delivery, chunk_size) in [(true, 1), (true, 3), (true, usize::MAX), (false, 5)] {
        let host = MockHost::new(stream_script(&frames, chunk_size));
        let transport = TransportBuilder::new(BASE_URL)
            .enable_chunked(chunked_delivery)
            .build_connect(host.clone());

        let response = transport
            .server_stream::<EchoRequest, EchoReply, _>(
                PROCEDURE,
                CallOptions::new(),
                stream::iter([request("hi")]),
            )
            .await
            .unwrap();
        assert_eq!(response.status_code, 200);

        let mut messages = response.message;
        let texts: Vec<String> = messages
            .collect_all()
            .await
            .unwrap()
            .into_iter()
            .map(|m| m.text)
            .collect();
        assert_eq!(texts, ["A", "B"], "chunk size {chunk_size}");
        assert_eq!(response.trailer.get().get("x"), Some("1"));

        let requests = host.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].enable_chunked, chunked_delivery);
    }
}

#[tokio::test]
async fn server_stream_end_stream_error() {
    let frames = [
        json_frame("A"),
        json_frame("B"),
        end_stream(
            r#"{"error":{"code":"resource_exhausted","message":"E"},"metadata":{"retry-after":["5"]}}"#,
        ),
    ];
    let host = MockHost::new(stream_script(&frames, 4));
    let transport = TransportBuilder::new(BASE_URL).build_connect(host);

    let response = transport
        .server_stream::<EchoRequest, EchoReply, _>(
            PROCEDURE,
            CallOptions::new(),
            stream::iter([request("hi")]),
        )
        .await
        .unwrap();
    let mut messages = response.message;

    assert_eq!(messages.next().await.unwrap().unwrap().text, "A");
    assert_eq!(messages.next().await.unwrap().unwrap().text, "B");

    let err = messages.next().await.unwrap().unwrap_err();
    assert_eq!(err.code(), Code::ResourceExhausted);
    assert_eq!(err.message(), Some("E"));
    let metadata = err.metadata().unwrap();
    assert_eq!(metadata.get("retry-after"), Some("5"));
    assert_eq!(metadata.get("content-type"), Some("application/connect+json"));

    assert!(messages.next().await.is_none());
    assert!(response.trailer.is_empty());
}

#[tokio::test]
async fn server_stream_truncated_body() {
    let mut wire = body(&[json_frame("A")]).to_vec();
    wire.truncate(wire.len() - 2);

    let host = MockHost::new(vec![
        HostEvent::Headers(200, headers(&[])),
        HostEvent::Chunk(wire.into()),
        HostEvent::Success,
    ]);
    let transport = TransportBuilder::new(BASE_URL).build_connect(host);

    let mut messages = transport
        .server_stream::<EchoRequest, EchoReply, _>(
            PROCEDURE,
            CallOptions::new(),
            stream::iter([request("hi")]),
        )
        .await
        .unwrap()
        .message;

    let err = messages.next().await.unwrap().unwrap_err();
    assert_eq!(err.code(), Code::DataLoss);
}

#[tokio::test]
async fn server_stream_missing_end_stream() {
    let host = MockHost::new(stream_script(&[json_frame("A")], 16));
    let transport = TransportBuilder::new(BASE_URL).build_connect(host);

    let mut messages = transport
        .server_stream::<EchoRequest, EchoReply, _>(
            PROCEDURE,
            CallOptions::new(),
            stream::iter([request("hi")]),
        )
        .await
        .unwrap()
        .message;

    assert!(messages.next().await.unwrap().is_ok());
    let err = messages.next().await.unwrap().unwrap_err();
    assert_eq!(err.message(), Some("missing EndStreamResponse"));
}

#[tokio::test]
async fn server_stream_exhausted_input_never_reaches_host() {
    let host = MockHost::new(vec![]);
    let transport = TransportBuilder::new(BASE_URL).build_connect(host.clone());

    let err = transport
        .server_stream::<EchoRequest, EchoReply, _>(PROCEDURE, CallOptions::new(), stream::empty())
        .await
        .unwrap_err();

    assert_eq!(err.message(), Some("missing request message"));
    assert!(matches!(err, ClientError::Protocol(_)));
    assert!(host.requests().is_empty());
}

#[tokio::test]
async fn server_stream_sends_only_first_input() {
    let host = MockHost::new(stream_script(&[end_stream("{}")], 64));
    let transport = TransportBuilder::new(BASE_URL).build_connect(host.clone());

    let response = transport
        .server_stream::<EchoRequest, EchoReply, _>(
            "/echo.v1.EchoService/Echo",
            CallOptions::new().header("authorization", "Bearer t"),
            stream::iter([request("first"), request("second")]),
        )
        .await
        .unwrap();
    let mut messages = response.message;
    assert_eq!(messages.drain().await.unwrap(), 0);

    let sent = &host.requests()[0];
    assert_eq!(sent.url, "https://api.example.com/echo.v1.EchoService/Echo");
    assert_eq!(sent.method, Method::POST);
    assert_eq!(
        sent.header.get("content-type").unwrap(),
        "application/connect+json"
    );
    assert_eq!(sent.header.get("connect-protocol-version").unwrap(), "1");
    assert_eq!(sent.header.get("authorization").unwrap(), "Bearer t");
    assert_eq!(sent.body, body(&[json_frame("first")]));
}

#[tokio::test]
async fn host_listeners_released_once() {
    let frames = [json_frame("A"), end_stream("{}")];
    let host = MockHost::new(stream_script(&frames, 2));
    let transport = TransportBuilder::new(BASE_URL).build_connect(host.clone());

    let response = transport
        .server_stream::<EchoRequest, EchoReply, _>(
            PROCEDURE,
            CallOptions::new(),
            stream::iter([request("hi")]),
        )
        .await
        .unwrap();
    let mut messages = response.message;
    assert_eq!(messages.collect_all().await.unwrap().len(), 1);
    drop(messages);

    host.settle().await;
    assert_eq!(host.off_calls(), (1, 1));
}

#[tokio::test]
async fn abandoned_stream_releases_listeners_on_completion() {
    let frames = [json_frame("A"), json_frame("B"), end_stream("{}")];
    let host = MockHost::new(stream_script(&frames, 1));
    let transport = TransportBuilder::new(BASE_URL).build_connect(host.clone());

    let response = transport
        .server_stream::<EchoRequest, EchoReply, _>(
            PROCEDURE,
            CallOptions::new(),
            stream::iter([request("hi")]),
        )
        .await
        .unwrap();
    drop(response);

    host.settle().await;
    assert_eq!(host.off_calls(), (1, 1));
}

#[tokio::test]
async fn server_stream_non_200() {
    let host = MockHost::new(vec![
        HostEvent::Headers(503, headers(&[("x-server", "edge")])),
        HostEvent::Success,
    ]);
    let transport = TransportBuilder::new(BASE_URL).build_connect(host);

    let err = transport
        .server_stream::<EchoRequest, EchoReply, _>(
            PROCEDURE,
            CallOptions::new(),
            stream::iter([request("hi")]),
        )
        .await
        .unwrap_err();
    assert_eq!(err.code(), Code::Unavailable);
    assert_eq!(err.message(), Some("HTTP 503"));
    assert_eq!(err.metadata().unwrap().get("x-server"), Some("edge"));
}

#[tokio::test]
async fn unary_message_and_trailer_headers() {
    let host = MockHost::new(vec![
        HostEvent::Headers(
            200,
            headers(&[
                ("content-type", "application/json"),
                ("trailer-x-cost", "3"),
            ]),
        ),
        HostEvent::Chunk(r#"{"text":"pong"}"#.into()),
        HostEvent::Success,
    ]);
    let transport = TransportBuilder::new(BASE_URL).build_connect(host.clone());

    let response = transport
        .unary::<EchoRequest, EchoReply>(PROCEDURE, CallOptions::new(), &request("ping"))
        .await
        .unwrap();

    assert_eq!(response.status_code, 200);
    assert_eq!(response.message().unwrap().text, "pong");
    assert_eq!(response.trailer.get("x-cost"), Some("3"));
    assert!(!response.header.contains("trailer-x-cost"));
    assert_eq!(response.header.get("content-type"), Some("application/json"));

    let sent = &host.requests()[0];
    assert!(!sent.enable_chunked);
    assert_eq!(sent.header.get("content-type").unwrap(), "application/json");
    assert_eq!(sent.header.get("connect-protocol-version").unwrap(), "1");
    assert_eq!(&sent.body[..], br#"{"text":"ping"}"#);
}

#[tokio::test]
async fn unary_error_body() {
    struct TestCase {
        name: &'static str,
        status: u16,
        body: &'static str,
        expected_code: Code,
        expected_message: Option<&'static str>,
    }

    let cases = [
        TestCase {
            name: "connect error json",
            status: 400,
            body: r#"{"code":"invalid_argument","message":"bad name"}"#,
            expected_code: Code::InvalidArgument,
            expected_message: Some("bad name"),
        },
        TestCase {
            name: "json without code uses http status",
            status: 404,
            body: r#"{"message":"gone"}"#,
            expected_code: Code::Unimplemented,
            expected_message: Some("gone"),
        },
        TestCase {
            name: "non json body",
            status: 503,
            body: "upstream unavailable",
            expected_code: Code::Unavailable,
            expected_message: Some("HTTP 503"),
        },
    ];

    for tc in cases {
        let host = MockHost::new(vec![
            HostEvent::Headers(tc.status, headers(&[("trailer-x-request-id", "abc")])),
            HostEvent::Chunk(tc.body.into()),
            HostEvent::Success,
        ]);
        let transport = TransportBuilder::new(BASE_URL).build_connect(host);

        let err = transport
            .unary::<EchoRequest, EchoReply>(PROCEDURE, CallOptions::new(), &request("ping"))
            .await
            .unwrap_err();
        assert_eq!(err.code(), tc.expected_code, "{}", tc.name);
        assert_eq!(err.message(), tc.expected_message, "{}", tc.name);
        assert_eq!(
            err.metadata().unwrap().get("x-request-id"),
            Some("abc"),
            "{}",
            tc.name
        );
    }
}

#[tokio::test]
async fn unary_host_failure() {
    let host = MockHost::new(vec![HostEvent::Fail(HostError::new(600001, "network down"))]);
    let transport = TransportBuilder::new(BASE_URL).build_connect(host);

    let err = transport
        .unary::<EchoRequest, EchoReply>(PROCEDURE, CallOptions::new(), &request("ping"))
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::Host { errno: 600001, .. }));
    assert_eq!(err.code(), Code::Internal);
}

#[tokio::test]
async fn timeout_resolution() {
    let script = vec![
        HostEvent::Headers(200, headers(&[])),
        HostEvent::Chunk(r#"{"text":"pong"}"#.into()),
        HostEvent::Success,
    ];
    let host = MockHost::new(script);
    let transport = TransportBuilder::new(BASE_URL)
        .default_timeout(Duration::from_secs(5))
        .build_connect(host.clone());

    let calls = [
        CallOptions::new(),
        CallOptions::new().timeout(Duration::from_millis(250)),
        CallOptions::new().timeout(Duration::ZERO),
    ];
    for options in calls {
        transport
            .unary::<EchoRequest, EchoReply>(PROCEDURE, options, &request("ping"))
            .await
            .unwrap();
    }

    let sent: Vec<_> = host
        .requests()
        .iter()
        .map(|r| {
            r.header
                .get("connect-timeout-ms")
                .map(|v| v.to_str().unwrap().to_string())
        })
        .collect();
    assert_eq!(
        sent,
        [Some("5000".to_string()), Some("250".to_string()), None]
    );
}

#[tokio::test]
async fn unary_through_transport_trait() {
    async fn echo<T: Transport>(transport: &T) -> Result<String, ClientError> {
        transport
            .unary::<EchoRequest, EchoReply>(PROCEDURE, CallOptions::new(), &request("ping"))
            .await?
            .into_message()
            .map(|m| m.text)
    }

    let host = MockHost::new(vec![
        HostEvent::Headers(200, headers(&[])),
        HostEvent::Chunk(r#"{"text":"pong"}"#.into()),
        HostEvent::Success,
    ]);
    let transport = TransportBuilder::new(BASE_URL).build_connect(host);
    assert_eq!(echo(&transport).await.unwrap(), "pong");
}
