use std::sync::Arc;

use {
    anyhow::{Context, Result, bail},
    async_trait::async_trait,
    clap::Args,
    courier_common::{CallContext, HookHandler, HookPoint, ReplyMessage, Response, RpcError},
    courier_config::CourierConfig,
    courier_protocol::{RequestInfo, TraceInfo},
    courier_server::{Courier, MemoryTransport, ServerEvent},
    serde_json::{Map, Value},
    tokio::sync::broadcast::error::TryRecvError,
    tracing::info,
};

#[derive(Args)]
pub struct ReplyArgs {
    /// JSON payload to reply with.
    #[arg(long, conflicts_with = "error")]
    payload: Option<String>,

    /// Reply with an error carrying this message.
    #[arg(long)]
    error: Option<String>,

    /// Error code attached to `--error`.
    #[arg(long, requires = "error")]
    code: Option<String>,

    /// Reply destination.
    #[arg(long, default_value = "inbox.cli", conflicts_with = "no_reply")]
    reply_to: String,

    /// Treat the call as fire-and-forget (no reply destination).
    #[arg(long, default_value_t = false)]
    no_reply: bool,

    /// JSON object copied into the envelope `meta`.
    #[arg(long)]
    meta: Option<String>,

    /// Request id.
    #[arg(long, default_value = "cli-1")]
    request_id: String,

    /// Service name recorded in the trace and in error hops.
    #[arg(long)]
    service: Option<String>,

    /// Method name recorded in the trace and in error hops.
    #[arg(long)]
    method: Option<String>,
}

impl ReplyArgs {
    fn message(&self) -> Result<ReplyMessage> {
        if let Some(message) = &self.error {
            let mut error = RpcError::new(message.clone());
            if let Some(code) = &self.code {
                error = error.with_code(code.clone());
            }
            return Ok(error.into());
        }
        let payload = match &self.payload {
            Some(raw) => serde_json::from_str(raw).context("--payload is not valid JSON")?,
            None => Value::Null,
        };
        Ok(payload.into())
    }

    fn call(&self) -> Result<CallContext> {
        let mut call = CallContext::new()
            .with_request(RequestInfo::new(self.request_id.clone()))
            .with_trace(TraceInfo {
                service: self.service.clone(),
                method: self.method.clone(),
                ..TraceInfo::default()
            });
        if !self.no_reply {
            call = call.with_reply_to(self.reply_to.clone());
        }
        if let Some(raw) = &self.meta {
            let meta: Map<String, Value> =
                serde_json::from_str(raw).context("--meta must be a JSON object")?;
            call = call.with_meta(meta);
        }
        Ok(call)
    }
}

/// Logs every lifecycle point a reply passes through.
struct TraceExtension;

#[async_trait]
impl HookHandler for TraceExtension {
    fn name(&self) -> &str {
        "cli-trace"
    }

    fn points(&self) -> &[HookPoint] {
        HookPoint::ALL
    }

    async fn handle(
        &self,
        point: HookPoint,
        call: &CallContext,
        response: &mut Response,
    ) -> Result<()> {
        info!(
            point = %point,
            request_id = ?call.request_id(),
            is_error = response.is_error(),
            "reply lifecycle"
        );
        Ok(())
    }
}

pub async fn handle_reply(config: CourierConfig, args: ReplyArgs) -> Result<()> {
    let message = args.message()?;
    let call = args.call()?;

    let (transport, mut deliveries) = MemoryTransport::channel();
    let courier = Courier::builder(config)
        .transport(Arc::new(transport))
        .extension(Arc::new(TraceExtension))
        .build()?;
    let mut events = courier.subscribe();

    let mut reply = courier.reply(call);
    reply.send(message).await;

    loop {
        match events.try_recv() {
            Ok(ServerEvent::ResponseError { error, .. }) => eprintln!("response error: {error}"),
            Ok(ServerEvent::PreResponse { .. }) | Err(TryRecvError::Lagged(_)) => {},
            Err(TryRecvError::Empty | TryRecvError::Closed) => break,
        }
    }

    match deliveries.try_recv() {
        Ok(delivery) => {
            let envelope: Value = serde_json::from_slice(&delivery.message)?;
            eprintln!("delivered to {}", delivery.reply_to);
            println!("{}", serde_json::to_string_pretty(&envelope)?);
        },
        Err(_) if args.no_reply => eprintln!("fire-and-forget call, nothing delivered"),
        Err(_) => bail!("no message was delivered"),
    }
    Ok(())
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, clap::Parser, serde_json::json};

    #[derive(Parser)]
    struct TestCli {
        #[command(flatten)]
        args: ReplyArgs,
    }

    fn parse(args: &[&str]) -> ReplyArgs {
        let argv = std::iter::once("courier").chain(args.iter().copied());
        TestCli::try_parse_from(argv).unwrap().args
    }

    #[test]
    fn payload_is_parsed_as_json() {
        let message = parse(&["--payload", r#"{"n": 0}"#]).message().unwrap();
        match message {
            ReplyMessage::Payload(value) => assert_eq!(value, json!({"n": 0})),
            ReplyMessage::Error(e) => panic!("unexpected error {e}"),
        }
    }

    #[test]
    fn missing_payload_sends_null() {
        let message = parse(&[]).message().unwrap();
        assert!(matches!(message, ReplyMessage::Payload(Value::Null)));
    }

    #[test]
    fn invalid_payload_is_rejected() {
        let err = parse(&["--payload", "{not json"]).message().unwrap_err();
        assert!(err.to_string().contains("--payload"));
    }

    #[test]
    fn error_carries_message_and_code() {
        let message = parse(&["--error", "boom", "--code", "E_BOOM"])
            .message()
            .unwrap();
        match message {
            ReplyMessage::Error(e) => {
                assert_eq!(e.message(), "boom");
                assert_eq!(e.code(), Some("E_BOOM"));
            },
            ReplyMessage::Payload(value) => panic!("unexpected payload {value}"),
        }
    }

    #[test]
    fn payload_and_error_conflict() {
        let result = TestCli::try_parse_from(["courier", "--payload", "1", "--error", "x"]);
        assert!(result.is_err());
    }

    #[test]
    fn call_uses_reply_to_request_and_trace() {
        let call = parse(&[
            "--reply-to",
            "inbox.9",
            "--request-id",
            "req-9",
            "--service",
            "orders",
            "--meta",
            r#"{"tenant": "acme"}"#,
        ])
        .call()
        .unwrap();

        assert_eq!(call.reply_to.as_deref(), Some("inbox.9"));
        assert_eq!(call.request_id(), Some("req-9"));
        let trace = call.trace.unwrap();
        assert_eq!(trace.service.as_deref(), Some("orders"));
        assert!(trace.method.is_none());
        assert_eq!(call.meta.unwrap()["tenant"], json!("acme"));
    }

    #[test]
    fn defaults_reply_to_cli_inbox() {
        let call = parse(&[]).call().unwrap();
        assert_eq!(call.reply_to.as_deref(), Some("inbox.cli"));
        assert!(call.meta.is_none());
    }

    #[test]
    fn no_reply_drops_destination() {
        let call = parse(&["--no-reply"]).call().unwrap();
        assert!(call.reply_to.is_none());
    }

    #[test]
    fn meta_must_be_an_object() {
        let err = parse(&["--meta", "[1, 2]"]).call().unwrap_err();
        assert!(err.to_string().contains("--meta"));
    }
}
