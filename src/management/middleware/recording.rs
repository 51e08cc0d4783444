//! # 请求录制中间件
//!
//! 请求生命周期钩子：处理器执行前 `record()`，执行后 `dump()`。
//! 请求作用域 [`RequestScope`] 通过请求扩展显式传给处理器。

use std::collections::BTreeMap;
use std::convert::Infallible;
use std::sync::Arc;

use axum::{
    body::{Body, Bytes},
    extract::{FromRequestParts, Request, State},
    http::{HeaderMap, header, request::Parts},
    middleware::Next,
    response::Response,
};

use tokio_stream::StreamExt;

use crate::lwarn;
use crate::logging::{LogComponent, LogStage};
use crate::management::server::AppState;
use crate::recorder::{QueryExecutor, RequestMeta, RequestScope};

/// 表示命令的请求参数名
const COMMAND_FIELD: &str = "cmd";
/// 方法调用路由前缀，未带 `cmd` 参数时取其后的部分作为命令
const METHOD_ROUTE_PREFIX: &str = "/api/method/";

/// 录制中间件
pub async fn recording_middleware(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let scope = Arc::new(RequestScope::new(Arc::clone(&state.database)));

    let mut request = request;
    if state.recorder.should_record(&scope).await {
        let (restored, meta) = capture_request_meta(request, state.recorder.config().max_form_bytes).await;
        request = restored;
        state.recorder.begin(&scope, meta);
    }

    request.extensions_mut().insert(Arc::clone(&scope));
    let response = next.run(request).await;
    state.recorder.dump(&scope).await;
    response
}

/// 采集请求元数据；表单请求体会被缓冲后原样放回
pub async fn capture_request_meta(request: Request, max_form_bytes: usize) -> (Request, RequestMeta) {
    let path = request.uri().path().to_string();
    let method = request.method().to_string();
    let headers = header_map(request.headers());

    let mut form_fields = BTreeMap::new();
    if let Some(query) = request.uri().query() {
        extend_fields(&mut form_fields, query.as_bytes());
    }

    let request = if should_buffer_form(request.headers(), max_form_bytes) {
        let (parts, body) = request.into_parts();
        let (body, buffered) = buffer_form_body(body, max_form_bytes).await;
        if let Some(bytes) = buffered {
            extend_fields(&mut form_fields, &bytes);
        }
        Request::from_parts(parts, body)
    } else {
        request
    };

    let command = form_fields
        .get(COMMAND_FIELD)
        .cloned()
        .or_else(|| path.strip_prefix(METHOD_ROUTE_PREFIX).map(str::to_string))
        .unwrap_or_default();

    let meta = RequestMeta {
        path,
        command,
        method,
        headers,
        form_fields,
    };
    (request, meta)
}

/// 缓冲表单请求体，最多 `limit` 字节
///
/// 读取完整时返回可重放的请求体和缓冲内容；超限或读取出错时不采集表单，
/// 已读部分与剩余数据流（包括错误本身）原样交给处理器。
async fn buffer_form_body(body: Body, limit: usize) -> (Body, Option<Bytes>) {
    let mut stream = body.into_data_stream();
    let mut buffered: Vec<u8> = Vec::new();

    while let Some(chunk) = stream.next().await {
        match chunk {
            Ok(chunk) => {
                buffered.extend_from_slice(&chunk);
                if buffered.len() > limit {
                    lwarn!(
                        "system",
                        LogStage::RequestStart,
                        LogComponent::Middleware,
                        "read_form_body",
                        &format!("表单请求体超过声明长度或上限 {limit} 字节，跳过表单采集")
                    );
                    let head = tokio_stream::iter([Ok(Bytes::from(buffered))]);
                    return (Body::from_stream(head.chain(stream)), None);
                }
            }
            Err(e) => {
                lwarn!(
                    "system",
                    LogStage::RequestStart,
                    LogComponent::Middleware,
                    "read_form_body",
                    &format!("读取表单请求体失败，跳过表单采集: {e}")
                );
                let replay = tokio_stream::iter([Ok(Bytes::from(buffered)), Err(e)]);
                return (Body::from_stream(replay), None);
            }
        }
    }

    let bytes = Bytes::from(buffered);
    (Body::from(bytes.clone()), Some(bytes))
}

fn header_map(headers: &HeaderMap) -> BTreeMap<String, String> {
    let mut map: BTreeMap<String, String> = BTreeMap::new();
    for (name, value) in headers {
        let Ok(value) = value.to_str() else { continue };
        map.entry(name.as_str().to_string())
            .and_modify(|existing| {
                existing.push_str(", ");
                existing.push_str(value);
            })
            .or_insert_with(|| value.to_string());
    }
    map
}

fn extend_fields(fields: &mut BTreeMap<String, String>, raw: &[u8]) {
    fields.extend(url::form_urlencoded::parse(raw).into_owned());
}

/// 只缓冲声明了长度且不超限的 urlencoded 表单
fn should_buffer_form(headers: &HeaderMap, max_form_bytes: usize) -> bool {
    let is_form = headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.starts_with("application/x-www-form-urlencoded"));
    let length = headers
        .get(header::CONTENT_LENGTH)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.parse::<usize>().ok());

    is_form && length.is_some_and(|length| length <= max_form_bytes)
}

/// 处理器获取请求作用域的提取器
///
/// 未经过录制中间件的请求得到 `None`。
#[derive(Clone, Default)]
pub struct ActiveScope(pub Option<Arc<RequestScope>>);

impl ActiveScope {
    #[must_use]
    pub fn scope(&self) -> Option<&RequestScope> {
        self.0.as_deref()
    }

    /// 本请求应使用的执行器；没有作用域时退回到给定的执行器
    #[must_use]
    pub fn executor_or(&self, fallback: &Arc<dyn QueryExecutor>) -> Arc<dyn QueryExecutor> {
        self.0
            .as_ref()
            .map_or_else(|| Arc::clone(fallback), |scope| scope.executor())
    }
}

impl<S> FromRequestParts<S> for ActiveScope
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self(parts.extensions.get::<Arc<RequestScope>>().cloned()))
    }
}
