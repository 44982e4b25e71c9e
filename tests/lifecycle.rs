//! End-to-end lifecycle scenarios through the built-in dispatchers

use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;

use flowcheck::alert::FieldValue;
use flowcheck::checks::CheckScratch;
use flowcheck::types::{
    Breed, DeploymentMode, Edition, Endpoint, InterfaceType, L4Protocol, ProtocolCategory, ProtocolInfo, TcpFlags,
};
use flowcheck::{
    AlertKind, AlertPayload, AsCounterStore, AsFlowCounts, ChecksConfig, Dispatcher, Environment, Flow, Host,
    MemorySink, Threshold,
};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn scan_config(incomplete: u64, ports: u64, as_client: u64, as_server: u64) -> ChecksConfig {
    let mut config = ChecksConfig::default();
    config.scan_detection.num_incomplete_flows_threshold = Threshold::new(incomplete);
    config.scan_detection.num_server_ports_threshold = Threshold::new(ports);
    config.scan_detection.as_client_threshold = Threshold::new(as_client);
    config.scan_detection.as_server_threshold = Threshold::new(as_server);
    config
}

fn scanner(asn: u32) -> Host {
    Host::new(IpAddr::V4(Ipv4Addr::new(10, 20, 30, 40))).local().with_asn(asn)
}

fn reset_flow(id: u64) -> Flow {
    let mut flow = Flow::new(
        id,
        Endpoint::new(IpAddr::V4(Ipv4Addr::new(192, 168, 0, 10)), 40000 + id as u16).local(),
        Endpoint::new(IpAddr::V4(Ipv4Addr::new(203, 0, 113, 1)), 8080),
        L4Protocol::Tcp,
    );
    flow.tcp.record_client(TcpFlags::from_u8(0x02));
    flow.tcp.record_server(TcpFlags::from_u8(0x14));
    flow
}

fn clean_flow(id: u64) -> Flow {
    let mut flow = reset_flow(id);
    flow.tcp = Default::default();
    flow.tcp.record_client(TcpFlags::from_u8(0x02));
    flow.tcp.record_server(TcpFlags::from_u8(0x12));
    flow.tcp.record_client(TcpFlags::from_u8(0x10));
    flow.tcp.record_client(TcpFlags::from_u8(0x11));
    flow.tcp.record_server(TcpFlags::from_u8(0x11));
    flow.counters.cli2srv_payload_bytes = 300;
    flow.counters.srv2cli_payload_bytes = 900;
    flow
}

#[test]
fn incomplete_flows_alert_once_at_threshold() {
    init_tracing();
    let store = Arc::new(AsCounterStore::new());
    let dispatcher = Dispatcher::hosts(&scan_config(5, 0, 0, 0), store).unwrap();
    let sink = MemorySink::new();
    let mut host = scanner(64500);
    let mut scratch = CheckScratch::new();

    let mut emitted_at = Vec::new();
    for count in [3u64, 4, 5, 6] {
        host.counters.num_incomplete_flows = count;
        if dispatcher.on_periodic_update(&host, &mut scratch, &sink) > 0 {
            emitted_at.push(count);
        }
    }
    assert_eq!(emitted_at, vec![5]);

    let alerts = sink.alerts();
    assert_eq!(alerts.len(), 1);
    assert_eq!(
        alerts[0].payload(),
        &AlertPayload::IncompleteFlows {
            num_incomplete_flows: 5,
            num_incomplete_flows_threshold: 5,
        }
    );

    // Still above threshold at host end: no re-alert
    host.counters.num_incomplete_flows = 9;
    assert_eq!(dispatcher.on_end(&host, &mut scratch, &sink), 0);
}

#[test]
fn incomplete_flows_incremented_one_by_one() {
    let dispatcher = Dispatcher::hosts(&scan_config(20, 0, 0, 0), Arc::new(AsCounterStore::new())).unwrap();
    let sink = MemorySink::new();
    let mut host = scanner(1);
    let mut scratch = CheckScratch::new();

    for count in 0..=100u64 {
        host.counters.num_incomplete_flows = count;
        dispatcher.on_periodic_update(&host, &mut scratch, &sink);
    }

    let alerts = sink.alerts();
    assert_eq!(alerts.len(), 1);
    let doc = alerts[0].payload().to_document();
    assert_eq!(doc.get("num_incomplete_flows"), Some(&FieldValue::U64(20)));
}

#[test]
fn scan_detected_at_host_end() {
    let dispatcher = Dispatcher::hosts(&scan_config(5, 0, 0, 0), Arc::new(AsCounterStore::new())).unwrap();
    let sink = MemorySink::new();
    let mut host = scanner(64500);
    let mut scratch = CheckScratch::new();

    host.counters.num_incomplete_flows = 2;
    assert_eq!(dispatcher.on_periodic_update(&host, &mut scratch, &sink), 0);

    // Crossed between the last update and host teardown
    host.counters.num_incomplete_flows = 8;
    assert_eq!(dispatcher.on_end(&host, &mut scratch, &sink), 1);
    assert_eq!(
        sink.alerts()[0].payload(),
        &AlertPayload::IncompleteFlows {
            num_incomplete_flows: 8,
            num_incomplete_flows_threshold: 5,
        }
    );
    assert_eq!(dispatcher.on_periodic_update(&host, &mut scratch, &sink), 0);
}

#[test]
fn server_ports_rearm_across_incomplete_flows_alert() {
    let dispatcher = Dispatcher::hosts(&scan_config(5, 10, 0, 0), Arc::new(AsCounterStore::new())).unwrap();
    let sink = MemorySink::new();
    let mut host = scanner(64500);
    let mut scratch = CheckScratch::new();

    host.counters.num_server_ports = 12;
    dispatcher.on_periodic_update(&host, &mut scratch, &sink);

    host.reset_counters();
    host.counters.num_incomplete_flows = 5;
    dispatcher.on_periodic_update(&host, &mut scratch, &sink);

    host.counters.num_server_ports = 12;
    dispatcher.on_periodic_update(&host, &mut scratch, &sink);

    let kinds: Vec<_> = sink
        .alerts()
        .iter()
        .map(|a| match a.payload() {
            AlertPayload::IncompleteFlows { .. } => "incomplete_flows",
            AlertPayload::ServerPorts { .. } => "server_ports",
            _ => "other",
        })
        .collect();
    assert_eq!(kinds, vec!["server_ports", "incomplete_flows", "server_ports"]);
}

#[test]
fn as_client_alert_with_disabled_server_threshold() {
    let store = Arc::new(AsCounterStore::new());
    let dispatcher = Dispatcher::hosts(&scan_config(0, 0, 100, 0), Arc::clone(&store)).unwrap();
    let sink = MemorySink::new();
    let host = scanner(64496);
    let mut scratch = CheckScratch::new();

    store.set(64496, AsFlowCounts { as_client: 99, as_server: 0 });
    assert_eq!(dispatcher.on_periodic_update(&host, &mut scratch, &sink), 0);

    store.set(64496, AsFlowCounts { as_client: 100, as_server: 0 });
    assert_eq!(dispatcher.on_periodic_update(&host, &mut scratch, &sink), 1);

    for as_server in [1u32, 500, 50_000] {
        store.set(64496, AsFlowCounts { as_client: 120, as_server });
        assert_eq!(dispatcher.on_periodic_update(&host, &mut scratch, &sink), 0);
    }

    let alerts = sink.alerts();
    assert_eq!(alerts.len(), 1);
    let doc = alerts[0].payload().to_document();
    assert!(matches!(alerts[0].payload(), AlertPayload::ServerPorts { .. }));
    assert_eq!(doc.keys(), alerts[0].payload().schema().to_vec());
    assert_eq!(doc.get("as_client"), Some(&FieldValue::U32(100)));
    assert_eq!(doc.get("as_client_threshold"), Some(&FieldValue::U32(100)));
    assert_eq!(doc.get("as_server_threshold"), Some(&FieldValue::U32(0)));
}

#[test]
fn zero_thresholds_never_fire() {
    let store = Arc::new(AsCounterStore::new());
    let dispatcher = Dispatcher::hosts(&scan_config(0, 0, 0, 0), Arc::clone(&store)).unwrap();
    let sink = MemorySink::new();
    let mut host = scanner(7);
    let mut scratch = CheckScratch::new();

    for value in [0u64, 1, 10, 10_000] {
        host.counters.num_incomplete_flows = value;
        host.counters.num_server_ports = value as u16;
        store.set(7, AsFlowCounts { as_client: value as u32, as_server: value as u32 });
        dispatcher.on_periodic_update(&host, &mut scratch, &sink);
    }
    dispatcher.on_end(&host, &mut scratch, &sink);
    assert!(sink.is_empty());
}

#[test]
fn tcp_reset_only_at_end() {
    let dispatcher = Dispatcher::flows(&ChecksConfig::default()).unwrap();
    let sink = MemorySink::new();
    let flow = reset_flow(1);
    let mut scratch = CheckScratch::new();

    assert_eq!(dispatcher.on_protocol_detected(&flow, &mut scratch, &sink), 0);
    assert_eq!(dispatcher.on_periodic_update(&flow, &mut scratch, &sink), 0);
    assert!(sink.is_empty());

    assert_eq!(dispatcher.on_end(&flow, &mut scratch, &sink), 1);
    assert_eq!(sink.kinds(), vec![AlertKind::TcpFlowReset]);
    assert!(sink.alerts()[0].payload().to_document().is_empty());

    // Duplicate end from upstream is a no-op
    assert_eq!(dispatcher.on_end(&flow, &mut scratch, &sink), 0);
    assert_eq!(sink.len(), 1);
}

#[test]
fn clean_close_does_not_alert() {
    let dispatcher = Dispatcher::flows(&ChecksConfig::default()).unwrap();
    let sink = MemorySink::new();
    let mut scratch = CheckScratch::new();
    assert_eq!(dispatcher.on_end(&clean_flow(2), &mut scratch, &sink), 0);
}

#[test]
fn packet_only_check_silent_on_flow_collector() {
    let mut config = ChecksConfig::default();
    config.environment = Environment::new(Edition::Enterprise, InterfaceType::FlowCollector, DeploymentMode::Standard);
    let dispatcher = Dispatcher::flows(&config).unwrap();
    assert!(!dispatcher.active_checks().contains(&"tcp_flow_reset"));

    let sink = MemorySink::new();
    for id in 0..10 {
        let mut scratch = CheckScratch::new();
        dispatcher.on_end(&reset_flow(id), &mut scratch, &sink);
    }
    assert!(sink.is_empty());
}

#[test]
fn edge_mode_excludes_tcp_reset() {
    let mut config = ChecksConfig::default();
    config.environment.mode = DeploymentMode::Edge;
    let dispatcher = Dispatcher::flows(&config).unwrap();
    assert_eq!(dispatcher.active_checks(), vec!["remote_to_local_insecure_proto"]);
}

#[test]
fn dispatch_order_is_deterministic() {
    fn run() -> Vec<(AlertKind, &'static str)> {
        let dispatcher = Dispatcher::flows(&ChecksConfig::default()).unwrap();
        let sink = MemorySink::new();

        for id in 0..5u64 {
            let mut flow = reset_flow(id);
            std::mem::swap(&mut flow.client, &mut flow.server);
            flow.protocol = Some(ProtocolInfo::new(7, Breed::Dangerous, ProtocolCategory(12)));
            if id % 2 == 0 {
                flow.tcp = Default::default();
            }
            let mut scratch = CheckScratch::new();
            dispatcher.on_protocol_detected(&flow, &mut scratch, &sink);
            dispatcher.on_periodic_update(&flow, &mut scratch, &sink);
            dispatcher.on_end(&flow, &mut scratch, &sink);
        }

        sink.alerts().iter().map(|a| (a.kind(), a.check())).collect()
    }

    let first = run();
    assert_eq!(first, run());
    assert_eq!(first.len(), 7);
    assert_eq!(first[0].0, AlertKind::RemoteToLocalInsecureProto);
}

#[test]
fn insecure_inbound_alert_uses_configured_category_name() {
    let config = ChecksConfig::from_toml_str("[category_names]\n\"12\" = \"Remote Access\"\n").unwrap();
    let dispatcher = Dispatcher::flows(&config).unwrap();
    let sink = MemorySink::new();

    let mut flow = Flow::new(
        3,
        Endpoint::new(IpAddr::V4(Ipv4Addr::new(198, 51, 100, 9)), 61000),
        Endpoint::new(IpAddr::V4(Ipv4Addr::new(192, 168, 1, 1)), 23).local(),
        L4Protocol::Tcp,
    );
    let mut scratch = CheckScratch::new();

    // Classification not yet available: nothing to say
    assert_eq!(dispatcher.on_protocol_detected(&flow, &mut scratch, &sink), 0);

    flow.protocol = Some(ProtocolInfo::new(77, Breed::Unsafe, ProtocolCategory(12)));
    let mut scratch = CheckScratch::new();
    assert_eq!(dispatcher.on_protocol_detected(&flow, &mut scratch, &sink), 1);

    let json: serde_json::Value = serde_json::from_str(&sink.alerts()[0].to_json().unwrap()).unwrap();
    assert_eq!(json["alert_kind"], "remote_to_local_insecure_proto");
    assert_eq!(json["alert_category"], "security");
    assert_eq!(json["score"], 50);
    assert_eq!(json["payload"]["ndpi_breed"], 3);
    assert_eq!(json["payload"]["ndpi_breed_name"], "Unsafe");
    assert_eq!(json["payload"]["ndpi_category_name"], "Remote Access");
    assert_eq!(json["payload"].as_object().unwrap().len(), 4);
}

#[test]
fn host_alert_json_document() {
    let store = Arc::new(AsCounterStore::new());
    let dispatcher = Dispatcher::hosts(&scan_config(5, 0, 0, 0), store).unwrap();
    let sink = MemorySink::new();
    let mut host = scanner(64500);
    host.counters.num_incomplete_flows = 5;
    dispatcher.on_periodic_update(&host, &mut CheckScratch::new(), &sink);

    let json: serde_json::Value = serde_json::from_str(&sink.alerts()[0].to_json().unwrap()).unwrap();
    assert_eq!(json["alert_kind"], "scan_detected");
    assert_eq!(json["alert_category"], "security");
    assert_eq!(json["score"], 80);
    assert_eq!(json["entity"]["host"]["ip"], "10.20.30.40");
    let payload = json["payload"].as_object().unwrap();
    let mut keys: Vec<_> = payload.keys().cloned().collect();
    keys.sort();
    assert_eq!(keys, vec!["num_incomplete_flows", "num_incomplete_flows_threshold"]);
}
