//! End-to-end import/export tests

use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use void_gltf::{CodecError, Document, NodeIndex, TraversalOrder};
use void_gltf_ext::names;
use void_gltf_ext::prelude::*;
use void_gltf_ext::{
    Capability, DiagnosticKind, ExtensionRegistry, ImportOutput, PassthroughHandler,
    PipelineConfig, PipelineError, PipelineResult, RawExtensions, SceneInstantiator,
    StructuralValidator,
};

// ----------------------------------------------------------------------------
// Test handlers
// ----------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Seat {
    back: [f64; 3],
    angle: f64,
}

struct SeatHandler;

#[async_trait::async_trait]
impl ExtensionHandler for SeatHandler {
    type Payload = Seat;

    fn name(&self) -> &str {
        names::OMI_SEAT
    }
}

#[async_trait::async_trait]
impl NodeExtensionHandler for SeatHandler {
    async fn import_node(
        &self,
        payload: Seat,
        _node: NodeIndex,
        object: ObjectId,
        ctx: &mut ImportContext<'_>,
        _cancel: &CancellationToken,
    ) -> HandlerResult<()> {
        ctx.scene_mut().insert_component(object, payload);
        Ok(())
    }

    async fn export_node(
        &self,
        _node: NodeIndex,
        object: ObjectId,
        ctx: &mut ExportContext<'_>,
        _cancel: &CancellationToken,
    ) -> HandlerResult<Option<Seat>> {
        Ok(ctx.scene().component::<Seat>(object).cloned())
    }
}

/// Document level: `{"shapes": [...]}`; node level: `{"shape": index}`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
struct ShapePayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    shapes: Option<Vec<Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    shape: Option<usize>,
}

#[derive(Debug, Clone, PartialEq)]
struct Collider(Value);

const SHAPES: &str = "shapes";

struct ShapeHandler;

impl ShapeHandler {
    fn resolve(&self, ctx: &ImportContext<'_>, index: usize) -> HandlerResult<Value> {
        let shapes = ctx
            .side_channel()
            .get::<Vec<Value>>(SHAPES)
            .map(Vec::as_slice)
            .unwrap_or(&[]);
        shapes.get(index).cloned().ok_or(HandlerError::Reference {
            array: SHAPES.into(),
            index,
            len: shapes.len(),
        })
    }
}

#[async_trait::async_trait]
impl ExtensionHandler for ShapeHandler {
    type Payload = ShapePayload;

    fn name(&self) -> &str {
        names::OMI_PHYSICS_SHAPE
    }

    fn priority(&self) -> i32 {
        10
    }
}

#[async_trait::async_trait]
impl NodeExtensionHandler for ShapeHandler {
    async fn import_node(
        &self,
        payload: ShapePayload,
        _node: NodeIndex,
        object: ObjectId,
        ctx: &mut ImportContext<'_>,
        _cancel: &CancellationToken,
    ) -> HandlerResult<()> {
        let Some(index) = payload.shape else {
            return Ok(());
        };
        let shape = self.resolve(ctx, index)?;
        ctx.scene_mut().insert_component(object, Collider(shape));
        Ok(())
    }

    async fn export_node(
        &self,
        _node: NodeIndex,
        object: ObjectId,
        ctx: &mut ExportContext<'_>,
        _cancel: &CancellationToken,
    ) -> HandlerResult<Option<ShapePayload>> {
        let Some(collider) = ctx.scene().component::<Collider>(object) else {
            return Ok(None);
        };
        let index = ctx.resources(SHAPES).get_or_register(&collider.0)?;
        Ok(Some(ShapePayload {
            shape: Some(index),
            ..Default::default()
        }))
    }
}

#[async_trait::async_trait]
impl DocumentExtensionHandler for ShapeHandler {
    async fn import_document(
        &self,
        payload: ShapePayload,
        ctx: &mut ImportContext<'_>,
        _cancel: &CancellationToken,
    ) -> HandlerResult<()> {
        ctx.side_channel_mut()
            .insert(SHAPES, payload.shapes.unwrap_or_default());
        Ok(())
    }

    async fn export_document(
        &self,
        ctx: &mut ExportContext<'_>,
        _cancel: &CancellationToken,
    ) -> HandlerResult<Option<ShapePayload>> {
        match ctx.resource_table(SHAPES) {
            Some(table) if !table.is_empty() => Ok(Some(ShapePayload {
                shapes: Some(table.values().to_vec()),
                ..Default::default()
            })),
            _ => Ok(None),
        }
    }
}

#[derive(Debug, PartialEq)]
struct Body;

#[derive(Debug, PartialEq)]
struct JointAttachment {
    joint: ObjectId,
}

struct BodyHandler;

#[async_trait::async_trait]
impl ExtensionHandler for BodyHandler {
    type Payload = Value;

    fn name(&self) -> &str {
        names::OMI_PHYSICS_BODY
    }
}

#[async_trait::async_trait]
impl NodeExtensionHandler for BodyHandler {
    async fn import_node(
        &self,
        _payload: Value,
        _node: NodeIndex,
        object: ObjectId,
        ctx: &mut ImportContext<'_>,
        _cancel: &CancellationToken,
    ) -> HandlerResult<()> {
        ctx.scene_mut().insert_component(object, Body);
        Ok(())
    }

    async fn export_node(
        &self,
        _node: NodeIndex,
        _object: ObjectId,
        _ctx: &mut ExportContext<'_>,
        _cancel: &CancellationToken,
    ) -> HandlerResult<Option<Value>> {
        Ok(None)
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JointPayload {
    connected_node: NodeIndex,
}

struct JointHandler;

#[async_trait::async_trait]
impl ExtensionHandler for JointHandler {
    type Payload = JointPayload;

    fn name(&self) -> &str {
        names::OMI_PHYSICS_JOINT
    }
}

#[async_trait::async_trait]
impl NodeExtensionHandler for JointHandler {
    async fn import_node(
        &self,
        payload: JointPayload,
        _node: NodeIndex,
        object: ObjectId,
        ctx: &mut ImportContext<'_>,
        _cancel: &CancellationToken,
    ) -> HandlerResult<()> {
        let connected = payload.connected_node;
        ctx.defer(move |ctx| {
            let target = ctx.object(connected)?;
            if !ctx.scene().has_component::<Body>(target) {
                return Err(HandlerError::failed("connected node has no body yet"));
            }
            ctx.scene_mut()
                .insert_component(target, JointAttachment { joint: object });
            Ok(())
        });
        Ok(())
    }

    async fn export_node(
        &self,
        _node: NodeIndex,
        _object: ObjectId,
        _ctx: &mut ExportContext<'_>,
        _cancel: &CancellationToken,
    ) -> HandlerResult<Option<JointPayload>> {
        Ok(None)
    }
}

/// Writes its name to the side channel and defers a read of its peer's
struct PeerReader {
    name: &'static str,
    peer: &'static str,
    log: Arc<Mutex<Vec<String>>>,
}

#[async_trait::async_trait]
impl ExtensionHandler for PeerReader {
    type Payload = Value;

    fn name(&self) -> &str {
        self.name
    }
}

#[async_trait::async_trait]
impl NodeExtensionHandler for PeerReader {
    async fn import_node(
        &self,
        _payload: Value,
        node: NodeIndex,
        _object: ObjectId,
        ctx: &mut ImportContext<'_>,
        _cancel: &CancellationToken,
    ) -> HandlerResult<()> {
        self.log.lock().push(format!("node {}", self.name));
        ctx.side_channel_mut().insert(self.name, node);

        let (name, peer, log) = (self.name, self.peer, Arc::clone(&self.log));
        ctx.defer(move |ctx| {
            let seen = ctx
                .side_channel()
                .get::<NodeIndex>(peer)
                .copied()
                .ok_or_else(|| HandlerError::failed(format!("{} not written", peer)))?;
            log.lock().push(format!("{} saw {} on node {}", name, peer, seen));
            Ok(())
        });
        Ok(())
    }

    async fn export_node(
        &self,
        _node: NodeIndex,
        _object: ObjectId,
        _ctx: &mut ExportContext<'_>,
        _cancel: &CancellationToken,
    ) -> HandlerResult<Option<Value>> {
        Ok(None)
    }
}

/// Marker written by the last of three deferred actions
#[derive(Debug, Clone, Copy, PartialEq)]
struct Settled(NodeIndex);

/// Defers a failing action, a panicking action and a scene write, in that order
struct DeferredFaults;

#[async_trait::async_trait]
impl ExtensionHandler for DeferredFaults {
    type Payload = Value;

    fn name(&self) -> &str {
        "VENDOR_deferred"
    }
}

#[async_trait::async_trait]
impl NodeExtensionHandler for DeferredFaults {
    async fn import_node(
        &self,
        _payload: Value,
        node: NodeIndex,
        object: ObjectId,
        ctx: &mut ImportContext<'_>,
        _cancel: &CancellationToken,
    ) -> HandlerResult<()> {
        ctx.defer(|_| Err(HandlerError::failed("target missing")));
        ctx.defer(|_| panic!("deferred action blew up"));
        ctx.defer(move |ctx| {
            ctx.scene_mut().insert_component(object, Settled(node));
            Ok(())
        });
        Ok(())
    }

    async fn export_node(
        &self,
        _node: NodeIndex,
        _object: ObjectId,
        _ctx: &mut ExportContext<'_>,
        _cancel: &CancellationToken,
    ) -> HandlerResult<Option<Value>> {
        Ok(None)
    }
}

/// Fails on even nodes by returning an error, on odd nodes by panicking
struct Faulty;

#[async_trait::async_trait]
impl ExtensionHandler for Faulty {
    type Payload = Value;

    fn name(&self) -> &str {
        "VENDOR_faulty"
    }

    fn priority(&self) -> i32 {
        100
    }
}

#[async_trait::async_trait]
impl NodeExtensionHandler for Faulty {
    async fn import_node(
        &self,
        _payload: Value,
        node: NodeIndex,
        _object: ObjectId,
        _ctx: &mut ImportContext<'_>,
        _cancel: &CancellationToken,
    ) -> HandlerResult<()> {
        if node % 2 == 1 {
            panic!("faulty handler on node {}", node);
        }
        Err(HandlerError::failed("faulty block"))
    }

    async fn export_node(
        &self,
        _node: NodeIndex,
        _object: ObjectId,
        _ctx: &mut ExportContext<'_>,
        _cancel: &CancellationToken,
    ) -> HandlerResult<Option<Value>> {
        Err(HandlerError::failed("cannot export"))
    }
}

/// Cancels the operation from inside a handler call
struct Canceller;

#[async_trait::async_trait]
impl ExtensionHandler for Canceller {
    type Payload = Value;

    fn name(&self) -> &str {
        "VENDOR_cancel"
    }
}

#[async_trait::async_trait]
impl NodeExtensionHandler for Canceller {
    async fn import_node(
        &self,
        _payload: Value,
        _node: NodeIndex,
        _object: ObjectId,
        _ctx: &mut ImportContext<'_>,
        cancel: &CancellationToken,
    ) -> HandlerResult<()> {
        cancel.cancel();
        Ok(())
    }

    async fn export_node(
        &self,
        _node: NodeIndex,
        _object: ObjectId,
        _ctx: &mut ExportContext<'_>,
        _cancel: &CancellationToken,
    ) -> HandlerResult<Option<Value>> {
        Ok(None)
    }
}

#[derive(Debug, PartialEq)]
struct Sky(Value);

/// Generic-only handler for a document-level block
struct SkyHandler;

#[async_trait::async_trait]
impl ExtensionHandler for SkyHandler {
    type Payload = Value;

    fn name(&self) -> &str {
        names::OMI_ENVIRONMENT_SKY
    }

    async fn import(
        &self,
        payload: Value,
        ctx: &mut ImportContext<'_>,
        _cancel: &CancellationToken,
    ) -> HandlerResult<()> {
        ctx.scene_mut().insert_resource(Sky(payload));
        Ok(())
    }

    async fn export(
        &self,
        ctx: &mut ExportContext<'_>,
        _cancel: &CancellationToken,
    ) -> HandlerResult<Option<Value>> {
        Ok(ctx.scene().resource::<Sky>().map(|sky| sky.0.clone()))
    }
}

/// Drops the objects of trailing nodes
struct Truncating {
    keep: usize,
}

impl SceneInstantiator for Truncating {
    fn instantiate(
        &self,
        document: &Document,
        order: &[NodeIndex],
        scene: &mut dyn SceneGraph,
    ) -> PipelineResult<Vec<ObjectId>> {
        let mut objects = HierarchyInstantiator.instantiate(document, order, scene)?;
        objects.truncate(self.keep);
        Ok(objects)
    }
}

// ----------------------------------------------------------------------------
// Helpers
// ----------------------------------------------------------------------------

fn pipeline(registrations: Vec<Registration>) -> ExtensionPipeline {
    pipeline_with(registrations, PipelineConfig::default())
}

fn pipeline_with(registrations: Vec<Registration>, config: PipelineConfig) -> ExtensionPipeline {
    let registry = SharedExtensionRegistry::new();
    for registration in registrations {
        registry.register(registration).unwrap();
    }
    ExtensionPipeline::with_config(registry, config)
}

async fn import(pipeline: &ExtensionPipeline, document: &Value) -> (MemoryScene, ImportOutput) {
    let mut scene = MemoryScene::new();
    let bytes = serde_json::to_vec(document).unwrap();
    let output = pipeline
        .import(&bytes, &mut scene, &HierarchyInstantiator, &CancellationToken::new())
        .await
        .unwrap();
    (scene, output)
}

fn physics_document() -> Value {
    json!({
        "asset": {"version": "2.0"},
        "extensionsUsed": ["OMI_physics_shape", "OMI_seat"],
        "extensions": {
            "OMI_physics_shape": {
                "shapes": [
                    {"type": "box", "box": {"size": [1.0, 2.0, 1.0]}},
                    {"type": "sphere", "sphere": {"radius": 0.5}}
                ]
            }
        },
        "nodes": [
            {"name": "crate", "extensions": {"OMI_physics_shape": {"shape": 0}}},
            {
                "name": "chair",
                "extensions": {
                    "OMI_physics_shape": {"shape": 1},
                    "OMI_seat": {"back": [0.0, 0.0, -1.0], "angle": 1.5}
                }
            },
            {"name": "plain"}
        ],
        "scenes": [{"nodes": [0, 1, 2]}],
        "scene": 0
    })
}

fn physics_handlers() -> Vec<Registration> {
    vec![
        Registration::node_and_document(ShapeHandler),
        Registration::node(SeatHandler),
    ]
}

// ----------------------------------------------------------------------------
// Registry
// ----------------------------------------------------------------------------

#[test]
fn test_capability_order_is_stable() {
    let mut registry = ExtensionRegistry::new();
    registry
        .register(Registration::node(SeatHandler).with_priority(1))
        .unwrap();
    registry
        .register(Registration::node_and_document(ShapeHandler).with_priority(5))
        .unwrap();
    registry
        .register(Registration::node(BodyHandler).with_priority(1))
        .unwrap();
    registry
        .register(Registration::generic(SkyHandler).with_priority(5))
        .unwrap();

    let names_of = |capability| {
        registry
            .handlers_with_capability(capability)
            .iter()
            .map(|h| h.name().to_string())
            .collect::<Vec<_>>()
    };

    let all = names_of(Capability::Generic);
    assert_eq!(
        all,
        vec![
            names::OMI_PHYSICS_SHAPE,
            names::OMI_ENVIRONMENT_SKY,
            names::OMI_SEAT,
            names::OMI_PHYSICS_BODY
        ]
    );
    assert_eq!(
        names_of(Capability::Node),
        vec![names::OMI_PHYSICS_SHAPE, names::OMI_SEAT, names::OMI_PHYSICS_BODY]
    );
    assert_eq!(names_of(Capability::Document), vec![names::OMI_PHYSICS_SHAPE]);

    for _ in 0..3 {
        assert_eq!(names_of(Capability::Generic), all);
    }
}

#[test]
fn test_reregistration_replaces_handler() {
    struct OtherSeat;

    #[async_trait::async_trait]
    impl ExtensionHandler for OtherSeat {
        type Payload = Value;

        fn name(&self) -> &str {
            names::OMI_SEAT
        }
    }

    let mut registry = ExtensionRegistry::new();
    registry.register(Registration::node(SeatHandler)).unwrap();
    registry.register(Registration::generic(OtherSeat)).unwrap();

    assert_eq!(registry.len(), 1);
    let handler = registry.lookup(names::OMI_SEAT).unwrap();
    assert!(handler.downcast::<OtherSeat>().is_some());
    assert!(handler.downcast::<SeatHandler>().is_none());
    assert!(registry.handlers_with_capability(Capability::Node).is_empty());
}

// ----------------------------------------------------------------------------
// Import
// ----------------------------------------------------------------------------

#[tokio::test]
async fn test_import_applies_document_then_node_blocks() {
    let pipeline = pipeline(physics_handlers());
    let (scene, output) = import(&pipeline, &physics_document()).await;

    assert!(output.report.is_clean(), "{:?}", output.report.diagnostics);
    assert_eq!(output.objects.len(), 3);
    assert_eq!(output.report.handler_calls, 4);

    let crate_object = scene.find("crate").unwrap();
    let chair = scene.find("chair").unwrap();
    assert_eq!(
        scene.component::<Collider>(crate_object),
        Some(&Collider(json!({"type": "box", "box": {"size": [1.0, 2.0, 1.0]}})))
    );
    assert_eq!(
        scene.component::<Seat>(chair),
        Some(&Seat {
            back: [0.0, 0.0, -1.0],
            angle: 1.5
        })
    );
    assert!(scene.component::<Seat>(crate_object).is_none());
}

#[tokio::test]
async fn test_deferred_actions_run_after_all_nodes_in_fifo_order() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let pipeline = pipeline(vec![
        Registration::node(PeerReader {
            name: "VENDOR_a",
            peer: "VENDOR_b",
            log: Arc::clone(&log),
        }),
        Registration::node(PeerReader {
            name: "VENDOR_b",
            peer: "VENDOR_a",
            log: Arc::clone(&log),
        }),
    ]);

    let document = json!({
        "asset": {"version": "2.0"},
        "nodes": [
            {"extensions": {"VENDOR_a": {}}},
            {"extensions": {"VENDOR_b": {}}}
        ]
    });
    let (_, output) = import(&pipeline, &document).await;

    assert!(output.report.is_clean(), "{:?}", output.report.diagnostics);
    assert_eq!(output.report.deferred_run, 2);
    assert_eq!(
        *log.lock(),
        vec![
            "node VENDOR_a",
            "node VENDOR_b",
            "VENDOR_a saw VENDOR_b on node 1",
            "VENDOR_b saw VENDOR_a on node 0",
        ]
    );
}

#[tokio::test]
async fn test_joint_resolves_node_visited_later() {
    let config = PipelineConfig {
        traversal: TraversalOrder::PreOrder,
        ..Default::default()
    };
    let pipeline = pipeline_with(
        vec![Registration::node(BodyHandler), Registration::node(JointHandler)],
        config,
    );

    let document = json!({
        "asset": {"version": "2.0"},
        "nodes": [
            {"name": "anchor", "extensions": {"OMI_physics_body": {"motion": {"type": "static"}}}},
            {"name": "other"},
            {"name": "joint", "extensions": {"OMI_physics_joint": {"connectedNode": 0}}}
        ],
        "scenes": [{"nodes": [2, 0, 1]}]
    });
    let (scene, output) = import(&pipeline, &document).await;

    assert!(output.report.is_clean(), "{:?}", output.report.diagnostics);
    assert_eq!(output.report.deferred_run, 1);

    // Node 2 is visited first
    let joint = scene.find("joint").unwrap();
    let anchor = scene.find("anchor").unwrap();
    assert_eq!(output.objects[0], joint);
    assert_eq!(
        scene.component::<JointAttachment>(anchor),
        Some(&JointAttachment { joint })
    );
}

#[tokio::test]
async fn test_unmapped_node_reports_single_reference_error() {
    let pipeline = pipeline(vec![Registration::node(SeatHandler)]);
    let seat = json!({"back": [0.0, 0.0, 1.0], "angle": 0.5});
    let document = json!({
        "asset": {"version": "2.0"},
        "nodes": [
            {"name": "a", "extensions": {"OMI_seat": seat.clone()}},
            {"name": "b", "extensions": {"OMI_seat": seat.clone()}},
            {"name": "c", "extensions": {"OMI_seat": seat, "VENDOR_unknown": {}}}
        ]
    });

    let mut scene = MemoryScene::new();
    let output = pipeline
        .import(
            &serde_json::to_vec(&document).unwrap(),
            &mut scene,
            &Truncating { keep: 2 },
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(output.report.count(DiagnosticKind::Reference), 1);
    assert_eq!(output.report.diagnostics.len(), 1);
    assert_eq!(output.report.diagnostics[0].node, Some(2));
    assert!(scene.component::<Seat>(scene.find("a").unwrap()).is_some());
    assert!(scene.component::<Seat>(scene.find("b").unwrap()).is_some());
    assert!(scene.component::<Seat>(scene.find("c").unwrap()).is_none());
}

#[tokio::test]
async fn test_deferred_failures_are_isolated() {
    let pipeline = pipeline(vec![Registration::node(DeferredFaults)]);
    let document = json!({
        "asset": {"version": "2.0"},
        "nodes": [{"name": "a"}, {"name": "b", "extensions": {"VENDOR_deferred": {}}}]
    });

    let (scene, output) = import(&pipeline, &document).await;
    let b = scene.find("b").unwrap();

    assert_eq!(output.report.deferred_run, 3);
    assert_eq!(output.report.count(DiagnosticKind::Deferred), 2);
    assert_eq!(output.report.diagnostics.len(), 2);
    for diagnostic in &output.report.diagnostics {
        assert_eq!(diagnostic.extension.as_deref(), Some("VENDOR_deferred"));
        assert_eq!(diagnostic.node, Some(1));
        assert_eq!(diagnostic.object, Some(b));
    }
    assert!(output.report.diagnostics[0].message.contains("target missing"));
    assert!(output.report.diagnostics[1].message.contains("panicked"));
    assert_eq!(scene.component::<Settled>(b), Some(&Settled(1)));
}

#[tokio::test]
async fn test_invalid_child_index_is_isolated() {
    let seat = json!({"back": [0.0, 0.0, 1.0], "angle": 0.25});
    let document = json!({
        "asset": {"version": "2.0"},
        "nodes": [
            {"name": "a", "children": [2], "extensions": {"OMI_seat": seat.clone()}},
            {"name": "b", "children": [99]},
            {"name": "c", "extensions": {"OMI_seat": seat}}
        ],
        "scenes": [{"nodes": [0, 1]}]
    });

    for traversal in [TraversalOrder::Declaration, TraversalOrder::PreOrder] {
        let config = PipelineConfig {
            traversal,
            ..Default::default()
        };
        let pipeline = pipeline_with(vec![Registration::node(SeatHandler)], config);
        let (scene, output) = import(&pipeline, &document).await;

        assert_eq!(output.objects.len(), 3, "{:?}", traversal);
        assert_eq!(output.report.count(DiagnosticKind::Reference), 1);
        assert_eq!(output.report.diagnostics.len(), 1);
        assert_eq!(output.report.diagnostics[0].node, Some(1));

        let (a, b, c) = (
            scene.find("a").unwrap(),
            scene.find("b").unwrap(),
            scene.find("c").unwrap(),
        );
        assert!(scene.component::<Seat>(a).is_some());
        assert!(scene.component::<Seat>(c).is_some());
        assert_eq!(scene.parent(c), Some(a));
        assert!(scene.children(b).is_empty());
    }
}

#[tokio::test]
async fn test_out_of_range_resource_reference_is_isolated() {
    let pipeline = pipeline(physics_handlers());
    let mut document = physics_document();
    document["nodes"][0]["extensions"]["OMI_physics_shape"]["shape"] = json!(9);

    let (scene, output) = import(&pipeline, &document).await;

    assert_eq!(output.report.count(DiagnosticKind::Reference), 1);
    assert!(scene.component::<Collider>(scene.find("crate").unwrap()).is_none());
    assert!(scene.component::<Collider>(scene.find("chair").unwrap()).is_some());
}

#[tokio::test]
async fn test_handler_errors_and_panics_are_isolated() {
    let pipeline = pipeline(vec![Registration::node(Faulty), Registration::node(SeatHandler)]);
    let seat = json!({"back": [0.0, 1.0, 0.0], "angle": 0.0});
    let document = json!({
        "asset": {"version": "2.0"},
        "nodes": [
            {"name": "a", "extensions": {"VENDOR_faulty": {}, "OMI_seat": seat.clone()}},
            {"name": "b", "extensions": {"VENDOR_faulty": {}, "OMI_seat": seat}}
        ]
    });

    let (scene, output) = import(&pipeline, &document).await;

    assert_eq!(output.report.count(DiagnosticKind::Handler), 2);
    assert!(output
        .report
        .of_kind(DiagnosticKind::Handler)
        .any(|d| d.message.contains("panicked")));
    assert!(scene.component::<Seat>(scene.find("a").unwrap()).is_some());
    assert!(scene.component::<Seat>(scene.find("b").unwrap()).is_some());
}

#[tokio::test]
async fn test_invalid_payload_is_a_handler_error() {
    let pipeline = pipeline(vec![Registration::node(SeatHandler)]);
    let document = json!({
        "asset": {"version": "2.0"},
        "nodes": [{"extensions": {"OMI_seat": {"angle": "steep"}}}]
    });

    let (_, output) = import(&pipeline, &document).await;
    assert_eq!(output.report.count(DiagnosticKind::Handler), 1);
    assert_eq!(output.report.diagnostics[0].extension.as_deref(), Some(names::OMI_SEAT));
}

#[tokio::test]
async fn test_validator_skips_error_blocks() {
    let registry = SharedExtensionRegistry::new();
    registry
        .register(Registration::node_and_document(PassthroughHandler::new("VENDOR_x")))
        .unwrap();
    let pipeline = ExtensionPipeline::new(registry).with_validator(Arc::new(StructuralValidator));

    let document = json!({
        "asset": {"version": "2.0"},
        "nodes": [
            {"name": "empty", "extensions": {"VENDOR_x": {}}},
            {"name": "scalar", "extensions": {"VENDOR_x": 7}}
        ]
    });
    let (scene, output) = import(&pipeline, &document).await;

    assert_eq!(output.report.count(DiagnosticKind::Validation), 2);
    assert_eq!(output.report.count(DiagnosticKind::Handler), 0);
    assert!(scene.component::<RawExtensions>(scene.find("empty").unwrap()).is_some());
    assert!(scene.component::<RawExtensions>(scene.find("scalar").unwrap()).is_none());
}

#[tokio::test]
async fn test_format_errors_abort_import() {
    let pipeline = pipeline(physics_handlers());
    let mut bytes = Vec::new();
    bytes.extend_from_slice(&0x4654_6C67u32.to_le_bytes());
    bytes.extend_from_slice(&1u32.to_le_bytes());
    bytes.extend_from_slice(&12u32.to_le_bytes());

    let mut scene = MemoryScene::new();
    let result = pipeline
        .import(&bytes, &mut scene, &HierarchyInstantiator, &CancellationToken::new())
        .await;

    assert!(matches!(
        result,
        Err(PipelineError::Codec(CodecError::UnsupportedVersion(1)))
    ));
    assert!(scene.is_empty());
}

#[tokio::test]
async fn test_cancellation_from_handler_aborts_import() {
    let pipeline = pipeline(vec![Registration::node(Canceller)]);
    let document = json!({
        "asset": {"version": "2.0"},
        "nodes": [{"extensions": {"VENDOR_cancel": {}}}, {}]
    });

    let mut scene = MemoryScene::new();
    let cancel = CancellationToken::new();
    let result = pipeline
        .import(
            &serde_json::to_vec(&document).unwrap(),
            &mut scene,
            &HierarchyInstantiator,
            &cancel,
        )
        .await;

    assert!(matches!(result, Err(PipelineError::Cancelled)));
    assert!(cancel.is_cancelled());
}

// ----------------------------------------------------------------------------
// Export
// ----------------------------------------------------------------------------

#[tokio::test]
async fn test_round_trip_preserves_extension_blocks() {
    let pipeline = pipeline(physics_handlers());
    let original = Document::from_value(physics_document()).unwrap();
    let (scene, _) = import(&pipeline, &physics_document()).await;

    let exported = pipeline
        .export(&scene, &HierarchyExporter, &CancellationToken::new())
        .await
        .unwrap();
    assert!(exported.report.is_clean(), "{:?}", exported.report.diagnostics);

    let mut reimported_scene = MemoryScene::new();
    let reimported = pipeline
        .import(
            &exported.bytes,
            &mut reimported_scene,
            &HierarchyInstantiator,
            &CancellationToken::new(),
        )
        .await
        .unwrap();
    let document = reimported.document;

    assert_eq!(document.node_count(), original.node_count());
    for node in 0..original.node_count() {
        assert_eq!(
            document.node_extensions(node).unwrap(),
            original.node_extensions(node).unwrap(),
            "node {}",
            node
        );
    }
    assert_eq!(
        document.document_extension(names::OMI_PHYSICS_SHAPE).unwrap(),
        original.document_extension(names::OMI_PHYSICS_SHAPE).unwrap()
    );

    let mut used = document.extensions_used().unwrap();
    used.sort();
    assert_eq!(used, vec![names::OMI_PHYSICS_SHAPE, names::OMI_SEAT]);
}

#[tokio::test]
async fn test_identical_shared_resources_collapse() {
    let pipeline = pipeline(physics_handlers());
    let unit_box = json!({"type": "box", "box": {"size": [1.0, 1.0, 1.0]}});

    let mut scene = MemoryScene::new();
    let a = scene.spawn(Some("a"));
    let b = scene.spawn(Some("b"));
    let c = scene.spawn(Some("c"));
    scene.insert_component(a, Collider(unit_box.clone()));
    scene.insert_component(b, Collider(unit_box.clone()));
    scene.insert_component(c, Collider(json!({"type": "sphere", "sphere": {"radius": 1.0}})));

    let output = pipeline
        .export(&scene, &HierarchyExporter, &CancellationToken::new())
        .await
        .unwrap();
    let document = output.document;

    let shape = |node| {
        document
            .node_extension(node, names::OMI_PHYSICS_SHAPE)
            .unwrap()
            .cloned()
    };
    assert_eq!(shape(0), Some(json!({"shape": 0})));
    assert_eq!(shape(1), Some(json!({"shape": 0})));
    assert_eq!(shape(2), Some(json!({"shape": 1})));

    let shapes = document
        .document_extension(names::OMI_PHYSICS_SHAPE)
        .unwrap()
        .and_then(|block| block.get("shapes"))
        .and_then(Value::as_array)
        .map(Vec::len);
    assert_eq!(shapes, Some(2));
    assert_eq!(output.report.node_blocks, 3);
}

#[tokio::test]
async fn test_absent_payload_is_not_injected() {
    let pipeline = pipeline(physics_handlers());
    let mut scene = MemoryScene::new();
    scene.spawn(Some("bare"));

    let output = pipeline
        .export(&scene, &HierarchyExporter, &CancellationToken::new())
        .await
        .unwrap();

    assert!(output.document.node_extensions(0).unwrap().is_none());
    assert!(output.document.document_extensions().unwrap().is_none());
    assert!(output.document.extensions_used().unwrap().is_empty());
    assert!(output.report.emitted.is_empty());
}

#[tokio::test]
async fn test_export_failures_are_isolated() {
    let pipeline = pipeline(vec![Registration::node(Faulty), Registration::node(SeatHandler)]);
    let mut scene = MemoryScene::new();
    let chair = scene.spawn(Some("chair"));
    scene.insert_component(
        chair,
        Seat {
            back: [1.0, 0.0, 0.0],
            angle: 0.25,
        },
    );

    let output = pipeline
        .export(&scene, &HierarchyExporter, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(output.report.count(DiagnosticKind::Handler), 1);
    assert_eq!(output.report.diagnostics[0].object, Some(chair));
    assert!(output
        .document
        .node_extension(0, names::OMI_SEAT)
        .unwrap()
        .is_some());
    assert!(output
        .document
        .node_extension(0, "VENDOR_faulty")
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn test_required_extensions_from_config() {
    let config = PipelineConfig {
        required_extensions: vec![names::OMI_SEAT.to_string()],
        ..Default::default()
    };
    let pipeline = pipeline_with(physics_handlers(), config);
    let (scene, _) = import(&pipeline, &physics_document()).await;

    let output = pipeline
        .export(&scene, &HierarchyExporter, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(output.document.extensions_required().unwrap(), vec![names::OMI_SEAT]);
}

#[tokio::test]
async fn test_generic_handler_round_trips_document_block() {
    let pipeline = pipeline(vec![Registration::generic(SkyHandler)]);
    let sky = json!({"type": "gradient", "gradient": {"topColor": [0.3, 0.5, 1.0]}});
    let document = json!({
        "asset": {"version": "2.0"},
        "extensions": {"OMI_environment_sky": sky.clone()},
        "nodes": [{"name": "root"}]
    });

    let (scene, _) = import(&pipeline, &document).await;
    assert_eq!(scene.resource::<Sky>(), Some(&Sky(sky.clone())));

    let output = pipeline
        .export(&scene, &HierarchyExporter, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(
        output
            .document
            .document_extension(names::OMI_ENVIRONMENT_SKY)
            .unwrap(),
        Some(&sky)
    );
}

#[tokio::test]
async fn test_passthrough_round_trip() {
    let document = json!({
        "asset": {"version": "2.0"},
        "extensions": {"VENDOR_world": {"seed": 42}},
        "nodes": [
            {"name": "a", "extensions": {"VENDOR_tag": {"tags": ["x", "y"]}}},
            {"name": "b", "children": [2]},
            {"name": "c", "extensions": {"VENDOR_tag": {"tags": []}, "VENDOR_world": {"local": true}}}
        ],
        "scenes": [{"nodes": [0, 1]}]
    });
    let original = Document::from_value(document.clone()).unwrap();

    let registry = SharedExtensionRegistry::new();
    for name in original.extension_names().unwrap() {
        registry
            .register(Registration::node_and_document(PassthroughHandler::new(name)))
            .unwrap();
    }
    let pipeline = ExtensionPipeline::new(registry);

    let (scene, output) = import(&pipeline, &document).await;
    assert!(output.report.is_clean(), "{:?}", output.report.diagnostics);

    let exported = pipeline
        .export(&scene, &HierarchyExporter, &CancellationToken::new())
        .await
        .unwrap();

    for node in 0..original.node_count() {
        assert_eq!(
            exported.document.node_extensions(node).unwrap(),
            original.node_extensions(node).unwrap()
        );
    }
    assert_eq!(
        exported.document.document_extensions().unwrap(),
        original.document_extensions().unwrap()
    );
    assert_eq!(exported.document.node_children(1).unwrap(), Some(vec![2]));
}

#[tokio::test]
async fn test_cancelled_export() {
    let pipeline = pipeline(physics_handlers());
    let mut scene = MemoryScene::new();
    scene.spawn(None);

    let cancel = CancellationToken::new();
    cancel.cancel();
    let result = pipeline.export(&scene, &HierarchyExporter, &cancel).await;
    assert!(matches!(result, Err(PipelineError::Cancelled)));
}
