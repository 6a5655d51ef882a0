use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use super::channel::{ChannelGuard, ChannelProvider};
use crate::backend::codec::{ForwardRequest, ReplyFrame};
use crate::collector::ResponseRegistry;
use crate::error::{ExecResult, ExecutionError};
use crate::handler::Dispatch;
use crate::response::ExecuteResponse;
use crate::route::RouteResult;

/// Forwards routed units over shared backend channels and collects the
/// replies through the response registry.
///
/// Replies may arrive in any order. They are put back in dispatch order
/// before merging, so the metadata always comes from the lowest-index
/// reply that carries it.
pub struct ForwardEngine {
    channels: Arc<dyn ChannelProvider>,
    registry: Arc<ResponseRegistry<ReplyFrame>>,
    timeout: Duration,
    fetch_size: Option<u32>,
    show_sql: bool,
}

impl ForwardEngine {
    pub fn new(
        channels: Arc<dyn ChannelProvider>,
        registry: Arc<ResponseRegistry<ReplyFrame>>,
        timeout: Duration,
    ) -> Self {
        Self {
            channels,
            registry,
            timeout,
            fetch_size: None,
            show_sql: false,
        }
    }

    pub fn with_fetch_size(mut self, fetch_size: Option<u32>) -> Self {
        self.fetch_size = fetch_size;
        self
    }

    pub fn with_show_sql(mut self, show_sql: bool) -> Self {
        self.show_sql = show_sql;
        self
    }

    pub fn registry(&self) -> &Arc<ResponseRegistry<ReplyFrame>> {
        &self.registry
    }

    pub async fn execute(&self, route: &RouteResult, return_generated_keys: bool) -> ExecResult<ExecuteResponse> {
        if route.is_empty() {
            return Ok(ExecuteResponse::empty());
        }

        let groups = route.group_by_data_source(return_generated_keys);
        let mut guards = Vec::with_capacity(groups.len());
        for group in &groups {
            guards.push(ChannelGuard::acquire(&self.channels, group.data_source()).await?);
        }

        let id = self.registry.next_correlation_id();
        // removes the entry on every exit, including a dropped future
        let _registration = self.registry.register_scoped(id, route.len())?;
        tracing::debug!("Forwarding {} units as {}", route.len(), id);

        // data source of each unit, by dispatch index
        let mut data_sources = Vec::with_capacity(route.len());
        for (group, guard) in groups.iter().zip(guards.iter_mut()) {
            for unit in group.units() {
                if self.show_sql {
                    tracing::info!("Actual SQL: {} ::: {}", unit.data_source(), unit.sql());
                }
                let request = ForwardRequest {
                    correlation_id: id,
                    unit_index: unit.index(),
                    sql: unit.sql().to_string(),
                    return_generated_keys: unit.return_generated_keys(),
                    capture_metadata: unit.index() == 0,
                    fetch_size: self.fetch_size,
                };
                guard.send(request).await?;
                data_sources.push(unit.data_source().to_string());
            }
        }
        // Replies are routed by correlation id, so the channels can serve
        // other statements while this one waits.
        drop(guards);

        let mut replies = self.registry.wait_for(id, self.timeout).await?;
        replies.sort_by_key(|frame| frame.unit_index);
        if replies
            .iter()
            .enumerate()
            .any(|(i, frame)| frame.unit_index != i)
        {
            return Err(ExecutionError::InvalidState(format!(
                "replies for {} do not cover unit indexes 0..{}",
                id,
                data_sources.len()
            )));
        }

        let units = replies
            .into_iter()
            .zip(&data_sources)
            .map(|(frame, data_source)| frame.reply.into_outcome().classify(data_source))
            .collect::<ExecResult<Vec<_>>>()?;

        ExecuteResponse::from_units(units)
    }
}

#[async_trait]
impl Dispatch for ForwardEngine {
    async fn dispatch(&self, route: &RouteResult, return_generated_keys: bool) -> ExecResult<ExecuteResponse> {
        self.execute(route, return_generated_keys).await
    }

    fn mode(&self) -> &'static str {
        "forward"
    }
}
