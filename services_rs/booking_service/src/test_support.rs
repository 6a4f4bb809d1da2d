//! In-process HTTP stub for outbound client tests. Serves canned responses in order,
//! one per connection, and reports what it received.

use std::collections::HashMap;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use tokio::sync::mpsc;

#[derive(Debug)]
pub struct CapturedRequest {
    pub method: String,
    pub path: String,
    pub headers: HashMap<String, String>,
    pub body: String,
}

impl CapturedRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(String::as_str)
    }

    pub fn json(&self) -> serde_json::Value {
        serde_json::from_str(&self.body).expect("json body")
    }
}

/// Reads one HTTP/1.1 request: request line, headers up to the blank line, then
/// `content-length` bytes of body.
async fn read_request<R>(reader: &mut BufReader<R>) -> std::io::Result<CapturedRequest>
where
    R: AsyncRead + Unpin,
{
    let mut line = String::new();
    reader.read_line(&mut line).await?;
    let mut request_line = line.split_whitespace();
    let method = request_line.next().unwrap_or_default().to_string();
    let path = request_line.next().unwrap_or_default().to_string();

    let mut headers = HashMap::new();
    loop {
        line.clear();
        if reader.read_line(&mut line).await? == 0 || line.trim_end().is_empty() {
            break;
        }
        if let Some((k, v)) = line.split_once(':') {
            headers.insert(k.trim().to_ascii_lowercase(), v.trim().to_string());
        }
    }

    let len = headers
        .get("content-length")
        .and_then(|v| v.parse::<usize>().ok())
        .unwrap_or(0);
    let mut body = vec![0u8; len];
    reader.read_exact(&mut body).await?;

    Ok(CapturedRequest {
        method,
        path,
        headers,
        body: String::from_utf8_lossy(&body).into_owned(),
    })
}

pub async fn spawn_stub_server(
    responses: Vec<(&'static str, String)>,
) -> (String, mpsc::UnboundedReceiver<CapturedRequest>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local addr");
    let (tx, rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        for (status_line, response_body) in responses {
            let Ok((stream, _)) = listener.accept().await else {
                return;
            };
            let mut stream = BufReader::new(stream);
            let Ok(captured) = read_request(&mut stream).await else {
                return;
            };
            let _ = tx.send(captured);

            let response = format!(
                "HTTP/1.1 {status_line}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{response_body}",
                response_body.len(),
            );
            let stream = stream.get_mut();
            let _ = stream.write_all(response.as_bytes()).await;
            let _ = stream.shutdown().await;
        }
    });

    (format!("http://{addr}"), rx)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn reads_headers_and_exact_body() {
        let raw = b"POST /v1/things?x=1 HTTP/1.1\r\nHost: stub\r\nContent-Type: application/json\r\nContent-Length: 10\r\n\r\n{\"a\":true}trailing";
        let mut reader = BufReader::new(&raw[..]);
        let req = read_request(&mut reader).await.unwrap();
        assert_eq!(req.method, "POST");
        assert_eq!(req.path, "/v1/things?x=1");
        assert_eq!(req.header("content-type"), Some("application/json"));
        assert_eq!(req.json()["a"], true);
    }
}
