//! GPU query pools.

use std::sync::Arc;

use crate::context::RendererContext;
use crate::error::{GraphicsError, GraphicsResult};
use crate::handle::{NativeHandle, ResourceId};

/// What a query measures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum QueryType {
    /// GPU clock value, in ticks of [`crate::Renderer::get_timestamp_frequency`].
    #[default]
    Timestamp,
    PipelineStatistics,
    Occlusion,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct QueryPoolDesc {
    pub query_type: QueryType,
    pub query_count: u32,
    pub node_index: u32,
}

impl QueryPoolDesc {
    pub fn new(query_type: QueryType, query_count: u32) -> Self {
        Self {
            query_type,
            query_count,
            node_index: 0,
        }
    }
}

/// A ring of queries of one type.
///
/// Results are `u64` values copied into a readback buffer by
/// [`crate::Cmd::resolve_query`].
pub struct QueryPool {
    context: Arc<RendererContext>,
    id: ResourceId,
    native: NativeHandle,
    desc: QueryPoolDesc,
}

impl QueryPool {
    /// Size in bytes of one resolved result.
    pub const RESULT_SIZE: u64 = std::mem::size_of::<u64>() as u64;

    pub(crate) fn create(context: &Arc<RendererContext>, desc: &QueryPoolDesc) -> GraphicsResult<Self> {
        if desc.query_count == 0 {
            return Err(GraphicsError::InvalidParameter(
                "query pool needs at least one query".to_string(),
            ));
        }
        context.check_node(desc.node_index, "query pool");
        let supported = match desc.query_type {
            QueryType::Timestamp => context.settings.timestamp_queries,
            QueryType::PipelineStatistics => context.settings.pipeline_statistics_queries,
            QueryType::Occlusion => context.settings.occlusion_queries,
        };
        if !supported {
            return Err(GraphicsError::FeatureNotSupported(format!(
                "{:?} queries",
                desc.query_type
            )));
        }
        let native = context.backend.create_query_pool(desc)?;
        let id = context.ids.next_id();
        log::trace!("QueryPool: created {id} ({:?} x{})", desc.query_type, desc.query_count);
        Ok(Self {
            context: Arc::clone(context),
            id,
            native,
            desc: *desc,
        })
    }

    pub fn id(&self) -> ResourceId {
        self.id
    }

    pub(crate) fn native(&self) -> NativeHandle {
        self.native
    }

    pub fn query_type(&self) -> QueryType {
        self.desc.query_type
    }

    pub fn count(&self) -> u32 {
        self.desc.query_count
    }
}

impl Drop for QueryPool {
    fn drop(&mut self) {
        self.context.backend.destroy_query_pool(self.native);
    }
}

impl std::fmt::Debug for QueryPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryPool")
            .field("id", &self.id)
            .field("desc", &self.desc)
            .finish()
    }
}

static_assertions::assert_impl_all!(QueryPool: Send, Sync);
