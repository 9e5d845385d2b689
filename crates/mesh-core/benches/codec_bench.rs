//! Criterion benchmarks for the bridge JSON codec.
//!
//! Every client request crosses the codec twice (frame decode, backend line
//! encode) and every reply twice more, so these numbers bound the per-message
//! overhead the bridge adds on top of the backend's own latency.
//!
//! Run with:
//! ```bash
//! cargo bench --package mesh-core --bench codec_bench
//! ```

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use mesh_core::protocol::jsonrpc::{methods, tool_call_params, JsonRpcRequest};
use mesh_core::{
    decode_line, decode_request, decode_server_message, encode_frame, encode_line,
    BridgeResponse,
};
use serde_json::{json, Value};

// ── Fixtures ──────────────────────────────────────────────────────────────────

fn search_frame() -> String {
    r#"{"id":2,"method":"memory/search","params":{"query":"dragon"}}"#.to_string()
}

fn nodes_result(count: usize) -> Value {
    let nodes: Vec<Value> = (0..count)
        .map(|i| {
            json!({
                "name": format!("character-{i}"),
                "nodeType": "character",
                "metadata": ["description: a knight", "trait: brave"],
            })
        })
        .collect();
    json!({ "content": [{ "type": "text", "text": Value::Array(nodes).to_string() }] })
}

fn backend_response_line(count: usize) -> String {
    json!({ "jsonrpc": "2.0", "id": 7, "result": nodes_result(count) }).to_string()
}

// ── Benchmarks ────────────────────────────────────────────────────────────────

fn bench_client_side(c: &mut Criterion) {
    let frame = search_frame();
    c.bench_function("decode_request/search", |b| {
        b.iter(|| decode_request(black_box(&frame)).unwrap())
    });

    let response = BridgeResponse::success(2, nodes_result(10));
    c.bench_function("encode_frame/response_10_nodes", |b| {
        b.iter(|| encode_frame(black_box(&response)).unwrap())
    });

    let encoded = encode_frame(&response).unwrap();
    c.bench_function("decode_server_message/response_10_nodes", |b| {
        b.iter(|| decode_server_message(black_box(&encoded)).unwrap())
    });
}

fn bench_backend_side(c: &mut Criterion) {
    let request = JsonRpcRequest::new(
        7,
        methods::TOOLS_CALL,
        Some(tool_call_params("search_memory", json!({ "query": "dragon" }))),
    );
    c.bench_function("encode_line/tools_call", |b| {
        b.iter(|| encode_line(black_box(&request)).unwrap())
    });

    let mut group = c.benchmark_group("decode_line/response");
    for count in [1usize, 10, 100] {
        let line = backend_response_line(count);
        group.bench_with_input(BenchmarkId::from_parameter(count), &line, |b, line| {
            b.iter(|| decode_line(black_box(line)).unwrap())
        });
    }
    group.finish();
}

criterion_group!(benches, bench_client_side, bench_backend_side);
criterion_main!(benches);
