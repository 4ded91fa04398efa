mod support;
mod sync_flow;
