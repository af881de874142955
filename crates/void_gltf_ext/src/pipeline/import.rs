//! Import sequence

use std::panic::AssertUnwindSafe;

use tokio::task::yield_now;
use void_gltf::{Document, JsonObject, NodeIndex};

use super::{ensure_live, panic_message, ExtensionPipeline, ImportOutput};
use crate::cancel::CancellationToken;
use crate::context::{ImportContext, ImportState};
use crate::error::{HandlerError, HandlerResult, PipelineError, PipelineResult};
use crate::handler::Capability;
use crate::instantiate::SceneInstantiator;
use crate::registry::RegisteredHandler;
use crate::report::{Diagnostic, DiagnosticKind, ImportReport};
use crate::scene::{ObjectId, SceneGraph};
use crate::validation::ValidationScope;

impl ExtensionPipeline {
    /// Parse wire bytes and import them into `scene`
    ///
    /// Format errors fail the whole call with no partial document. Handler,
    /// reference and deferred-action failures are recovered and listed in
    /// the report.
    pub async fn import(
        &self,
        bytes: &[u8],
        scene: &mut dyn SceneGraph,
        instantiator: &dyn SceneInstantiator,
        cancel: &CancellationToken,
    ) -> PipelineResult<ImportOutput> {
        let document = match void_gltf::parse(bytes) {
            Ok(document) => document,
            Err(e) => {
                log::error!("Import aborted: {}", e);
                return Err(e.into());
            }
        };
        self.import_document(document, scene, instantiator, cancel).await
    }

    /// Import an already parsed document into `scene`
    pub async fn import_document(
        &self,
        document: Document,
        scene: &mut dyn SceneGraph,
        instantiator: &dyn SceneInstantiator,
        cancel: &CancellationToken,
    ) -> PipelineResult<ImportOutput> {
        let handlers = self.registry.snapshot();
        let order = document.traversal_order(self.config.traversal)?;
        let mut report = ImportReport::default();

        for (node, e) in document.child_errors() {
            report.push(Diagnostic::from_handler_error(&HandlerError::from(e)).with_node(Some(node)));
        }

        log::debug!(
            "Importing {} nodes with {} registered handlers",
            order.len(),
            handlers.len()
        );

        let result = {
            let mut ctx = ImportContext::new(scene, &document, handlers);
            let result = self
                .run_import(&mut ctx, &order, instantiator, &mut report, cancel)
                .await;
            ctx.dispose();
            result
        };

        match result {
            Ok(objects) => {
                log::info!(
                    "Imported {} nodes: {} handler calls, {} deferred actions, {} diagnostics",
                    objects.len(),
                    report.handler_calls,
                    report.deferred_run,
                    report.diagnostics.len()
                );
                Ok(ImportOutput {
                    document,
                    objects,
                    report,
                })
            }
            Err(e) => {
                log::error!("Import aborted: {}", e);
                Err(e)
            }
        }
    }

    async fn run_import(
        &self,
        ctx: &mut ImportContext<'_>,
        order: &[NodeIndex],
        instantiator: &dyn SceneInstantiator,
        report: &mut ImportReport,
        cancel: &CancellationToken,
    ) -> PipelineResult<Vec<ObjectId>> {
        self.import_document_blocks(ctx, report, cancel).await?;
        ctx.advance(ImportState::DocumentHandlersRun);

        let objects = self.map_nodes(ctx, order, instantiator, cancel).await?;
        ctx.advance(ImportState::NodesMapped);

        self.import_node_blocks(ctx, order, report, cancel).await?;
        ctx.advance(ImportState::NodeHandlersRun);

        self.drain_deferred(ctx, report, cancel).await?;
        ctx.advance(ImportState::DeferredActionsDrained);

        Ok(objects)
    }

    /// Document-level blocks, every handler in priority order
    async fn import_document_blocks(
        &self,
        ctx: &mut ImportContext<'_>,
        report: &mut ImportReport,
        cancel: &CancellationToken,
    ) -> PipelineResult<()> {
        let document = ctx.document();
        let Some(blocks) = document.document_extensions()? else {
            return Ok(());
        };
        let handlers = ctx.handlers();

        for handler in handlers.all() {
            let Some(block) = blocks.get(handler.name()) else {
                continue;
            };
            let generic = handler.capabilities().is_generic_only();
            if handler.document().is_none() && !generic {
                continue;
            }

            ensure_live(cancel)?;
            if !self.validate(handler.name(), ValidationScope::Document, block, report) {
                continue;
            }

            log::debug!("Importing document-level '{}'", handler.name());
            ctx.set_current(Some(handler.name_arc()), None);
            let result = match handler.document() {
                Some(document_handler) => {
                    self.guarded(document_handler.import_document(block.clone(), ctx, cancel))
                        .await
                }
                None => {
                    self.guarded(handler.generic().import(block.clone(), ctx, cancel))
                        .await
                }
            };
            report.handler_calls += 1;
            settle(result, report, handler, None, None, cancel)?;
        }

        ctx.set_current(None, None);
        Ok(())
    }

    /// Instantiate scene objects and build the node/object mapping
    async fn map_nodes(
        &self,
        ctx: &mut ImportContext<'_>,
        order: &[NodeIndex],
        instantiator: &dyn SceneInstantiator,
        cancel: &CancellationToken,
    ) -> PipelineResult<Vec<ObjectId>> {
        ensure_live(cancel)?;

        let document = ctx.document();
        let objects = instantiator.instantiate(document, order, ctx.scene_mut())?;

        if objects.len() < order.len() {
            log::warn!(
                "Instantiator created {} objects for {} nodes; {} nodes left unmapped",
                objects.len(),
                order.len(),
                order.len() - objects.len()
            );
        } else if objects.len() > order.len() {
            log::debug!(
                "Ignoring {} objects beyond the node walk",
                objects.len() - order.len()
            );
        }

        let chunk = self.config.effective_chunk_size();
        for (i, (&node, &object)) in order.iter().zip(&objects).enumerate() {
            ctx.map_node(node, object);
            if (i + 1) % chunk == 0 {
                yield_now().await;
                ensure_live(cancel)?;
            }
        }

        Ok(objects)
    }

    /// Node-level blocks, node by node in traversal order
    async fn import_node_blocks(
        &self,
        ctx: &mut ImportContext<'_>,
        order: &[NodeIndex],
        report: &mut ImportReport,
        cancel: &CancellationToken,
    ) -> PipelineResult<()> {
        let document = ctx.document();
        let handlers = ctx.handlers();
        let node_handlers = handlers.with_capability(Capability::Node);

        for nodes in order.chunks(self.config.effective_chunk_size()) {
            for &node in nodes {
                let blocks = match document.node_extensions(node) {
                    Ok(Some(blocks)) => blocks,
                    Ok(None) => continue,
                    Err(e) => {
                        report.push(
                            Diagnostic::new(DiagnosticKind::Handler, e.to_string())
                                .with_node(Some(node)),
                        );
                        continue;
                    }
                };
                report.nodes_with_extensions += 1;
                self.import_node(ctx, node, blocks, node_handlers, report, cancel)
                    .await?;
            }

            yield_now().await;
            ensure_live(cancel)?;
        }

        ctx.set_current(None, None);
        Ok(())
    }

    async fn import_node(
        &self,
        ctx: &mut ImportContext<'_>,
        node: NodeIndex,
        blocks: &JsonObject,
        handlers: &[RegisteredHandler],
        report: &mut ImportReport,
        cancel: &CancellationToken,
    ) -> PipelineResult<()> {
        let object = ctx.try_object(node);
        let mut unmapped_reported = false;

        for handler in handlers {
            let (Some(block), Some(node_handler)) = (blocks.get(handler.name()), handler.node())
            else {
                continue;
            };

            let Some(object) = object else {
                if !unmapped_reported {
                    unmapped_reported = true;
                    report.push(
                        Diagnostic::from_handler_error(&HandlerError::UnmappedNode(node))
                            .with_extension(handler.name())
                            .with_node(Some(node)),
                    );
                }
                continue;
            };

            ensure_live(cancel)?;
            if !self.validate(handler.name(), ValidationScope::Node(node), block, report) {
                continue;
            }

            log::debug!("Importing '{}' on node {}", handler.name(), node);
            ctx.set_current(Some(handler.name_arc()), Some(node));
            let result = self
                .guarded(node_handler.import_node(block.clone(), node, object, ctx, cancel))
                .await;
            report.handler_calls += 1;
            settle(result, report, handler, Some(node), Some(object), cancel)?;
        }

        Ok(())
    }

    /// Run deferred actions in FIFO order until the queue is empty
    async fn drain_deferred(
        &self,
        ctx: &mut ImportContext<'_>,
        report: &mut ImportReport,
        cancel: &CancellationToken,
    ) -> PipelineResult<()> {
        let chunk = self.config.effective_chunk_size();
        let mut since_yield = 0;

        while let Some(action) = ctx.next_deferred() {
            let extension = action.extension;
            let node = action.node;
            let run = action.run;

            ctx.set_current(extension.clone(), node);
            let result: HandlerResult<()> = if self.config.isolate_panics {
                match std::panic::catch_unwind(AssertUnwindSafe(|| run(ctx))) {
                    Ok(result) => result,
                    Err(payload) => Err(HandlerError::Panicked(panic_message(payload.as_ref()))),
                }
            } else {
                run(ctx)
            };
            report.deferred_run += 1;

            if let Err(error) = result {
                let mut diagnostic = Diagnostic::new(DiagnosticKind::Deferred, error.to_string())
                    .with_node(node)
                    .with_object(node.and_then(|n| ctx.try_object(n)));
                if let Some(extension) = &extension {
                    diagnostic = diagnostic.with_extension(extension.as_ref());
                }
                report.push(diagnostic);
            }

            since_yield += 1;
            if since_yield >= chunk {
                since_yield = 0;
                yield_now().await;
                ensure_live(cancel)?;
            }
        }

        ctx.set_current(None, None);
        Ok(())
    }
}

/// Record a handler outcome; only a cancellation observed by the handler aborts
fn settle(
    result: HandlerResult<()>,
    report: &mut ImportReport,
    handler: &RegisteredHandler,
    node: Option<NodeIndex>,
    object: Option<ObjectId>,
    cancel: &CancellationToken,
) -> PipelineResult<()> {
    match result {
        Ok(()) => Ok(()),
        Err(HandlerError::Cancelled) if cancel.is_cancelled() => Err(PipelineError::Cancelled),
        Err(error) => {
            report.push(
                Diagnostic::from_handler_error(&error)
                    .with_extension(handler.name())
                    .with_node(node)
                    .with_object(object),
            );
            Ok(())
        }
    }
}
