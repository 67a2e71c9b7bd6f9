//! Registers chunk-server RPC methods onto a `gfs_tools::rpc::Router`
//! (spec.md §6).

use std::sync::Arc;

use gfs_types::messages::{
    AppendRequest, DeleteBadChunkRequest, GetChunkHandlesResponse, GetChunkInfoRequest, HeartbeatRequest,
    OrderChunkCopyRequest, PushDataRequest, ReadRequest, WriteRequest,
};
use gfs_tools::rpc::Router;

use crate::server::ChunkServer;

pub fn build_router(server: Arc<ChunkServer>) -> Router {
    let mut router = Router::new();

    let s = server.clone();
    router.register("push_data", move |req: PushDataRequest| {
        let s = s.clone();
        async move {
            s.push_data(req.client_id, req.timestamp, req.data);
            Ok::<_, gfs_types::GfsError>(())
        }
    });

    let s = server.clone();
    router.register("write", move |req: WriteRequest| {
        let s = s.clone();
        async move {
            s.write(
                req.client_id,
                req.timestamp,
                &req.path,
                req.chunk_index,
                req.chunk_handle,
                req.offset,
                &req.replicas,
            )
            .await
        }
    });

    let s = server.clone();
    router.register("serialized_write", move |req: WriteRequest| {
        let s = s.clone();
        async move {
            s.serialized_write(
                req.client_id,
                req.timestamp,
                &req.path,
                req.chunk_index,
                req.chunk_handle,
                req.offset,
            )
            .await
        }
    });

    let s = server.clone();
    router.register("append", move |req: AppendRequest| {
        let s = s.clone();
        async move {
            s.append(
                req.client_id,
                req.timestamp,
                &req.path,
                req.chunk_index,
                req.chunk_handle,
                &req.replicas,
            )
            .await
        }
    });

    let s = server.clone();
    router.register("read", move |req: ReadRequest| {
        let s = s.clone();
        async move { s.read(req.chunk_handle, req.offset, req.length) }
    });

    let s = server.clone();
    router.register("get_chunk_info_from_peer", move |req: GetChunkInfoRequest| {
        let s = s.clone();
        async move { s.get_chunk_info(req.chunk_handle) }
    });

    let s = server.clone();
    router.register("order_chunk_copy_from_peer", move |req: OrderChunkCopyRequest| {
        let s = s.clone();
        async move { s.order_chunk_copy_from_peer(&req.peer, req.chunk_handle).await }
    });

    let s = server.clone();
    router.register("delete_bad_chunk", move |req: DeleteBadChunkRequest| {
        let s = s.clone();
        async move {
            s.delete_bad_chunk(req.chunk_handle);
            Ok::<_, gfs_types::GfsError>(())
        }
    });

    let s = server.clone();
    router.register("get_chunk_handles", move |_req: ()| {
        let s = s.clone();
        async move {
            Ok::<_, gfs_types::GfsError>(GetChunkHandlesResponse {
                handles: s.get_chunk_handles(),
            })
        }
    });

    let s = server.clone();
    router.register("heartbeat", move |req: HeartbeatRequest| {
        let s = s.clone();
        async move { Ok::<_, gfs_types::GfsError>(s.heartbeat(&req)) }
    });

    router
}
