use std::io;
use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::ChildStdin;

use crate::logs::LogBuffer;

pub(crate) async fn read_stream_capture<R: AsyncRead + Unpin>(
    mut reader: R,
    sink: Arc<LogBuffer>,
) -> io::Result<()> {
    let mut chunk = [0u8; 4096];
    loop {
        let n = reader.read(&mut chunk).await?;
        if n == 0 {
            break;
        }
        sink.append(&chunk[..n]).await;
    }
    Ok(())
}

pub(crate) async fn write_stdin(mut stdin: ChildStdin, input: String) {
    let result = async {
        stdin.write_all(input.as_bytes()).await?;
        stdin.shutdown().await
    }
    .await;
    if let Err(err) = result {
        // The process may exit without reading its input.
        tracing::debug!(error = %err, "stdin write stopped early");
    }
}
