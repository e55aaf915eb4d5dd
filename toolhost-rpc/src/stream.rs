//! Stream Transport: newline-delimited JSON-RPC over an arbitrary byte
//! stream (stdio in the common case).

use tokio::io::{AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};

use crate::envelope::parse_request;
use crate::handler::JsonRpcHandler;

/// Reads `\n`-terminated envelopes from `reader`, dispatches each through
/// `handler`, and writes responses to `writer` in the order received.
/// Whitespace-only lines are ignored; malformed JSON produces a `-32700`
/// response rather than aborting the loop. End-of-stream triggers the
/// handler's configured server-stop hook and returns.
///
/// `tokio::io::BufReader::read_line` supplies the "maintain a buffer, split
/// at newline" behavior the contract calls for — there is no hand-rolled
/// byte-buffer here, just the standard async line reader.
pub async fn run<R, W>(handler: &JsonRpcHandler, reader: R, mut writer: W)
where
    R: tokio::io::AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut reader = BufReader::new(reader);
    let mut line = String::new();

    loop {
        line.clear();
        let read = match reader.read_line(&mut line).await {
            Ok(n) => n,
            Err(err) => {
                tracing::error!(error = %err, "stream transport read failed");
                break;
            }
        };
        if read == 0 {
            tracing::info!("stream transport reached end-of-stream, stopping");
            break;
        }

        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let response = match parse_request(trimmed) {
            Ok(request) => handler.handle(request).await,
            Err(err) => Some(handler.handle_parse_error(None, err)),
        };

        let Some(response) = response else { continue };
        let mut text = match serde_json::to_string(&response) {
            Ok(text) => text,
            Err(err) => {
                tracing::error!(error = %err, "failed to serialize response envelope");
                continue;
            }
        };
        text.push('\n');
        if let Err(err) = writer.write_all(text.as_bytes()).await {
            tracing::error!(error = %err, "stream transport write failed");
            break;
        }
        if let Err(err) = writer.flush().await {
            tracing::error!(error = %err, "stream transport flush failed");
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    use toolhost_core::config::Config;
    use toolhost_core::services::ServiceBag;
    use toolhost_dispatch::{Dispatcher, NoopCollective};
    use toolhost_events::EventBus;
    use toolhost_persistence::PersistenceManager;
    use toolhost_registry::{ToolDescriptor, ToolFactory, ToolOutput, ToolRegistry};
    use toolhost_session::SessionManager;

    use crate::handler::{JsonRpcHandler, NoopControl, ServerControl, ServerIdentity};

    struct EchoFactory;
    impl ToolFactory for EchoFactory {
        fn name(&self) -> &str {
            "echo"
        }
        fn create(&self, _services: &ServiceBag) -> Option<ToolOutput> {
            Some(ToolOutput::One(ToolDescriptor::new(
                "echo",
                "echoes input",
                serde_json::json!({}),
                Arc::new(|args: serde_json::Value| async move { Ok(args) }),
            )))
        }
    }

    async fn handler(control: Arc<dyn ServerControl>) -> JsonRpcHandler {
        let bus = EventBus::new();
        let persistence = PersistenceManager::initialize(&Config::in_memory_for_tests()).await;
        let sessions = Arc::new(SessionManager::new(&persistence, bus.clone()));
        sessions.start_session("u", None, None).await;
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(EchoFactory));
        registry.create_all(&ServiceBag::new());
        let registry = Arc::new(registry);
        let dispatcher =
            Arc::new(Dispatcher::new(Arc::clone(&registry), sessions, bus, Arc::new(NoopCollective)));
        JsonRpcHandler::new(registry, dispatcher, ServerIdentity { name: "t".into(), version: "0".into() }, control)
    }

    #[tokio::test]
    async fn one_response_line_per_request_line() {
        let handler = handler(Arc::new(NoopControl)).await;
        let input = b"{\"jsonrpc\":\"2.0\",\"id\":1,\"method\":\"ping\"}\n".to_vec();
        let mut output = Vec::new();
        run(&handler, input.as_slice(), &mut output).await;
        let text = String::from_utf8(output).unwrap();
        assert_eq!(text.lines().count(), 1);
        let parsed: serde_json::Value = serde_json::from_str(text.lines().next().unwrap()).unwrap();
        assert_eq!(parsed["result"]["pong"], true);
    }

    #[tokio::test]
    async fn malformed_json_yields_parse_error_response() {
        let handler = handler(Arc::new(NoopControl)).await;
        let input = b"not json\n".to_vec();
        let mut output = Vec::new();
        run(&handler, input.as_slice(), &mut output).await;
        let text = String::from_utf8(output).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(text.trim()).unwrap();
        assert_eq!(parsed["error"]["code"], toolhost_core::error::rpc_code::PARSE_ERROR);
    }

    #[tokio::test]
    async fn whitespace_only_lines_produce_no_response() {
        let handler = handler(Arc::new(NoopControl)).await;
        let input = b"   \n\t\n".to_vec();
        let mut output = Vec::new();
        run(&handler, input.as_slice(), &mut output).await;
        assert!(output.is_empty());
    }

    #[tokio::test]
    async fn notifications_produce_no_output_line() {
        let handler = handler(Arc::new(NoopControl)).await;
        let input = b"{\"jsonrpc\":\"2.0\",\"method\":\"initialized\"}\n".to_vec();
        let mut output = Vec::new();
        run(&handler, input.as_slice(), &mut output).await;
        assert!(output.is_empty());
    }

    #[tokio::test]
    async fn shutdown_request_invokes_control_before_stream_ends() {
        struct FlagControl(Arc<AtomicBool>);
        impl ServerControl for FlagControl {
            fn request_stop(&self) {
                self.0.store(true, Ordering::SeqCst);
            }
        }
        let flag = Arc::new(AtomicBool::new(false));
        let handler = handler(Arc::new(FlagControl(Arc::clone(&flag)))).await;
        let input = b"{\"jsonrpc\":\"2.0\",\"id\":1,\"method\":\"shutdown\"}\n".to_vec();
        let mut output = Vec::new();
        run(&handler, input.as_slice(), &mut output).await;
        assert!(flag.load(Ordering::SeqCst));
    }
}
