//! 传输边界：状态码、错误主体与通道帧。
//!
//! # 教案式说明
//! - **意图 (Why)**：服务器实现只搬运字节与状态码，错误分类必须在适配层一次做对：
//!   客户端的问题要说清楚，服务端的问题不能泄露细节。
//! - **契约 (What)**：
//!   - 接收阶段的解码、校验错误为 400，主体带可读信息与追踪标识；
//!   - 执行失败默认为 500，主体只含追踪标识；[`Rejection`] 可指定状态码；
//!   - 取消为 499；空请求体按空对象处理；
//!   - 流式交换保留失败前已写出的行，无输出时状态为 204；
//!   - 通道会话以 `data` 帧逐条输出，以 `close` 或 `error` 帧结束。

use duet_core::transport::{
    Frame, FrameKind, Rejection, STATUS_CLIENT_CLOSED, exchange, exchange_stream, serve_channel,
};
use duet_core::{
    Binder, BoxError, CallContext, Cancellation, Emitter, JsonCodec, Node, Object, SchemaRegistry,
    StreamBinder, StreamingOperation,
};

#[derive(Object, Clone, Debug, Default)]
struct Fetch {
    #[api("in,required")]
    #[enc("key")]
    key: String,
    #[api("out")]
    #[enc("value")]
    value: String,
}

impl duet_core::Operation for Fetch {
    fn execute(&mut self, _cx: &CallContext) -> Result<(), BoxError> {
        self.value = match self.key.as_str() {
            "a" => "apple".to_owned(),
            "boom" => return Err(Box::new(std::io::Error::other("disk on fire"))),
            other => return Err(Box::new(Rejection::not_found(format!("no such key {other}")))),
        };
        Ok(())
    }
}

#[derive(Object, Clone, Debug, Default)]
struct Ping {
    #[api("out")]
    #[enc("pong")]
    pong: bool,
}

impl duet_core::Operation for Ping {
    fn execute(&mut self, _cx: &CallContext) -> Result<(), BoxError> {
        self.pong = true;
        Ok(())
    }
}

#[derive(Object, Clone, Debug, Default)]
struct Whoami {
    #[api("auth,required")]
    #[enc("user")]
    user: String,
    #[api("out")]
    #[enc("hello")]
    hello: String,
}

impl duet_core::Operation for Whoami {
    fn execute(&mut self, _cx: &CallContext) -> Result<(), BoxError> {
        self.hello = format!("hi {}", self.user);
        Ok(())
    }
}

#[derive(Object, Clone, Debug, Default, PartialEq)]
struct Tick {
    #[api("out")]
    #[enc("n")]
    n: u32,
}

#[derive(Object, Clone, Debug, Default)]
struct Count {
    #[api("in")]
    #[enc("upto")]
    upto: u32,
    #[api("in")]
    #[enc("fail_at")]
    fail_at: Option<u32>,
}

impl StreamingOperation for Count {
    type Item = Tick;

    fn stream(&mut self, _cx: &CallContext, emitter: &mut Emitter<'_, Tick>) -> Result<(), BoxError> {
        for n in 0..self.upto {
            if self.fail_at == Some(n) {
                return Err(Box::new(std::io::Error::other("counter jammed")));
            }
            emitter.emit(&Tick { n })?;
        }
        Ok(())
    }
}

fn fetch() -> Binder<Fetch> {
    Binder::new(&SchemaRegistry::new(), Fetch::default()).expect("Fetch 的 Schema 合法")
}

fn count() -> StreamBinder<Count> {
    StreamBinder::new(&SchemaRegistry::new(), Count::default()).expect("Count 的 Schema 合法")
}

fn tracked() -> CallContext {
    CallContext::new().with_tracking_id("req-9")
}

fn text(bytes: &[u8]) -> &str {
    std::str::from_utf8(bytes).expect("输出为 UTF-8")
}

#[test]
fn successful_exchange_returns_response_view() {
    let body = exchange(&fetch(), br#"{"key":"a"}"#, &tracked()).expect("成功");
    assert_eq!(text(&body), r#"{"value":"apple"}"#);
}

#[test]
fn empty_request_body_is_an_empty_object() {
    let binder = Binder::new(&SchemaRegistry::new(), Ping::default()).expect("合法");
    let body = exchange(&binder, b"", &CallContext::new()).expect("空主体等价于 {}");
    assert_eq!(text(&body), r#"{"pong":true}"#);

    let error = exchange(&fetch(), b"  ", &tracked()).expect_err("空对象缺少必填项");
    assert_eq!(error.status(), 400);
    assert_eq!(error.client_message(), Some("missing required field key"));
}

#[test]
fn client_input_problems_are_bad_requests() {
    let binder = fetch();
    let cx = tracked();

    let error = exchange(&binder, br#"{"key":5}"#, &cx).expect_err("类型不符");
    assert_eq!(error.status(), 400);
    assert_eq!(error.code(), duet_core::codes::DECODE_TYPE_MISMATCH);
    assert_eq!(
        text(&error.body()),
        r#"{"error":"cannot decode integer into string at key","tracking":"req-9"}"#
    );

    let error = exchange(&binder, b"not json", &cx).expect_err("语法错误");
    assert_eq!(error.status(), 400);
    assert_eq!(error.code(), duet_core::codes::DECODE_MALFORMED);
}

#[test]
fn rejections_choose_their_status() {
    let error = exchange(&fetch(), br#"{"key":"zzz"}"#, &tracked()).expect_err("键不存在");
    assert_eq!(error.status(), 404);
    assert_eq!(
        text(&error.body()),
        r#"{"error":"no such key zzz","tracking":"req-9"}"#
    );
}

#[test]
fn server_failures_hide_details() {
    let error = exchange(&fetch(), br#"{"key":"boom"}"#, &tracked()).expect_err("执行失败");
    assert_eq!(error.status(), 500);
    assert_eq!(error.tracking(), Some("req-9"));
    assert_eq!(text(&error.body()), r#"{"tracking":"req-9"}"#);
    assert!(error.message().contains("disk on fire"), "日志侧保留细节");
}

#[test]
fn identities_that_do_not_fit_are_server_errors() {
    let binder = Binder::new(&SchemaRegistry::new(), Whoami::default()).expect("合法");
    let member = JsonCodec::default()
        .decode_str(r#"{"user":"alice","tenant":"t1"}"#)
        .expect("合法 JSON");
    let body = exchange(&binder, b"", &tracked().with_identity(member)).expect("按成员取 user");
    assert_eq!(text(&body), r#"{"hello":"hi alice"}"#);

    let cx = tracked().with_identity(Node::Integer(7));
    let error = exchange(&binder, b"", &cx).expect_err("整数不是用户名");
    assert_eq!(error.status(), 500);
    assert_eq!(text(&error.body()), r#"{"tracking":"req-9"}"#, "身份细节不外泄");

    let error = exchange(&binder, b"", &tracked()).expect_err("没有身份");
    assert_eq!(error.status(), 400);
}

#[test]
fn cancelled_exchanges_use_client_closed_status() {
    let cancellation = Cancellation::new();
    cancellation.cancel();
    let cx = CallContext::new().with_cancellation(cancellation);
    let error = exchange(&fetch(), br#"{"key":"a"}"#, &cx).expect_err("已取消");
    assert_eq!(error.status(), STATUS_CLIENT_CLOSED);
    assert_eq!(error.tracking(), None);
}

#[test]
fn stream_exchange_writes_one_line_per_item() {
    let outcome = exchange_stream(&count(), br#"{"upto":3}"#, &tracked()).expect("成功");
    assert_eq!(outcome.status(), 200);
    assert_eq!(outcome.emitted(), 3);
    assert!(outcome.failure().is_none());
    assert_eq!(text(outcome.body()), "{\"n\":0}\n{\"n\":1}\n{\"n\":2}\n");
}

#[test]
fn empty_stream_is_no_content() {
    let outcome = exchange_stream(&count(), b"", &tracked()).expect("成功");
    assert_eq!(outcome.status(), 204);
    assert!(outcome.body().is_empty());
}

#[test]
fn late_stream_failure_keeps_written_lines() {
    let binder = count();
    let outcome = exchange_stream(&binder, br#"{"upto":5,"fail_at":2}"#, &tracked())
        .expect("已有输出时不整体失败");
    assert_eq!(outcome.status(), 200);
    assert_eq!(outcome.emitted(), 2);
    let failure = outcome.failure().expect("记录了失败");
    assert_eq!(failure.status(), 500);
    assert_eq!(failure.client_message(), None);

    let ticks = binder
        .client_receive_lines(outcome.body())
        .expect("已写出的行完整可解码");
    assert_eq!(ticks, [Tick { n: 0 }, Tick { n: 1 }]);
}

#[test]
fn early_stream_failure_is_a_plain_error() {
    let error = exchange_stream(&count(), br#"{"upto":5,"fail_at":0}"#, &tracked())
        .expect_err("首条之前失败");
    assert_eq!(error.status(), 500);

    let error = exchange_stream(&count(), br#"{"upto":"many"}"#, &tracked()).expect_err("输入错误");
    assert_eq!(error.status(), 400);
}

fn run_channel(open: &Frame) -> (Vec<Frame>, Result<usize, duet_core::StreamError>) {
    let mut frames = Vec::new();
    let mut sink = |frame: Frame| -> duet_core::Result<()> {
        frames.push(frame);
        Ok(())
    };
    let outcome = serve_channel(&count(), open, &CallContext::new(), &mut sink);
    (frames, outcome)
}

fn payload(text: &str) -> Node {
    JsonCodec::default().decode_str(text).expect("合法 JSON")
}

#[test]
fn channel_streams_data_frames_then_closes() {
    let (frames, outcome) = run_channel(&Frame::open("c1", "count", payload(r#"{"upto":2}"#)));
    assert_eq!(outcome.expect("会话成功"), 2);

    let kinds: Vec<FrameKind> = frames.iter().map(|frame| frame.kind).collect();
    assert_eq!(kinds, [FrameKind::Data, FrameKind::Data, FrameKind::Close]);
    assert!(frames.iter().all(|frame| frame.channel == "c1"));
    assert_eq!(frames[0].path, "count");

    let codec = JsonCodec::default();
    assert_eq!(codec.encode_to_string(&frames[1].data), r#"{"n":1}"#);
}

#[test]
fn channel_failures_end_with_an_error_frame() {
    let (frames, outcome) =
        run_channel(&Frame::open("c2", "count", payload(r#"{"upto":4,"fail_at":1}"#)));
    let failure = outcome.expect_err("中途失败");
    assert_eq!(failure.emitted, 1);

    let last = frames.last().expect("至少一帧");
    assert_eq!(frames.len(), 2);
    assert_eq!(last.kind, FrameKind::Error);
    assert_eq!(last.data, Node::from("internal error"), "内部错误不外泄");
}

#[tracing_test::traced_test]
#[test]
fn undelivered_error_frames_keep_the_original_failure() {
    let mut attempts = 0usize;
    let outcome = {
        let mut sink = |frame: Frame| -> duet_core::Result<()> {
            attempts += 1;
            match frame.kind {
                FrameKind::Error => Err(duet_core::DuetError::internal("peer hung up")),
                _ => Ok(()),
            }
        };
        let open = Frame::open("c6", "count", payload(r#"{"upto":3,"fail_at":1}"#));
        serve_channel(&count(), &open, &CallContext::new(), &mut sink)
    };
    assert_eq!(attempts, 2, "一个数据帧加一次错误帧尝试");
    let failure = outcome.expect_err("中途失败");
    assert_eq!(failure.emitted, 1);
    assert_eq!(failure.error.code(), duet_core::codes::EXECUTION_FAILED, "返回原始错误");
    assert!(logs_contain("error frame not delivered"));
    assert!(logs_contain("peer hung up"));
}

#[test]
fn channel_reports_client_faults_verbatim() {
    let (frames, outcome) = run_channel(&Frame::open("c3", "count", payload(r#"{"upto":"x"}"#)));
    assert_eq!(outcome.expect_err("输入错误").emitted, 0);
    assert_eq!(frames.len(), 1);
    assert_eq!(
        frames[0].data,
        Node::from("cannot decode string into u32 at upto")
    );
}

#[test]
fn channel_requires_an_open_frame() {
    let (frames, outcome) = run_channel(&Frame::data("c4", "count", Node::Nil));
    assert!(outcome.is_err());
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0].kind, FrameKind::Error);
}

#[test]
fn legacy_new_frames_open_a_session() {
    let registry = SchemaRegistry::new();
    let open: Frame = registry
        .from_json(
            br#"{"channel":"c5","path":"count","type":"new","data":{"upto":1}}"#,
            &JsonCodec::default(),
        )
        .expect("合法帧");
    let (frames, outcome) = run_channel(&open);
    assert_eq!(outcome.expect("会话成功"), 1);
    assert_eq!(frames.len(), 2);
}
