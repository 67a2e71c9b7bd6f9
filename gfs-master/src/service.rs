//! Registers every master-side RPC method onto a `gfs_tools::rpc::Router`
//! (spec.md §6). Each handler decodes its request, calls the matching
//! `Master` method, and lets the router encode the response or error.

use std::sync::Arc;

use gfs_types::messages::{
    AddChunkRequest, CreateDirRequest, CreateRequest, DeleteRequest, FindLeaseHolderRequest, FindLocationsRequest,
    GetFileLengthRequest, ListRequest, NotifyMasterRequest, ReportChunkRequest, UniqueClientIdResponse,
};
use gfs_tools::rpc::Router;

use crate::master::Master;

pub fn build_router(master: Arc<Master>) -> Router {
    let mut router = Router::new();

    let m = master.clone();
    router.register("unique_client_id", move |_req: ()| {
        let m = m.clone();
        async move {
            m.unique_client_id()
                .map(|client_id| UniqueClientIdResponse { client_id })
        }
    });

    let m = master.clone();
    router.register("create", move |req: CreateRequest| {
        let m = m.clone();
        async move { m.create(&req.path) }
    });

    let m = master.clone();
    router.register("create_dir", move |req: CreateDirRequest| {
        let m = m.clone();
        async move { m.create_dir(&req.path) }
    });

    let m = master.clone();
    router.register("list", move |req: ListRequest| {
        let m = m.clone();
        async move { m.list(&req.path) }
    });

    let m = master.clone();
    router.register("delete", move |req: DeleteRequest| {
        let m = m.clone();
        async move { m.delete(&req.path) }
    });

    let m = master.clone();
    router.register("get_file_length", move |req: GetFileLengthRequest| {
        let m = m.clone();
        async move { m.get_file_length(&req.path) }
    });

    let m = master.clone();
    router.register("add_chunk", move |req: AddChunkRequest| {
        let m = m.clone();
        async move { m.add_chunk(&req.path, req.chunk_index) }
    });

    let m = master.clone();
    router.register("find_locations", move |req: FindLocationsRequest| {
        let m = m.clone();
        async move { m.find_locations(&req.path, req.chunk_index) }
    });

    let m = master.clone();
    router.register("find_lease_holder", move |req: FindLeaseHolderRequest| {
        let m = m.clone();
        async move { m.find_lease_holder(req.chunk_handle) }
    });

    let m = master.clone();
    router.register("report_chunk", move |req: ReportChunkRequest| {
        let m = m.clone();
        async move { m.report_chunk(&req).map(|_| ()) }
    });

    let m = master.clone();
    router.register("notify_master", move |req: NotifyMasterRequest| {
        let m = m.clone();
        async move { m.notify_master(&req.address) }
    });

    router
}
