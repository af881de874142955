//! Export sequence

use tokio::task::yield_now;
use void_gltf::Document;

use super::inject::{inject, EmittedBlocks};
use super::{ensure_live, export_failure, ExportOutput, ExtensionPipeline};
use crate::cancel::CancellationToken;
use crate::context::{ExportContext, ExportState};
use crate::error::{HandlerError, PipelineError, PipelineResult};
use crate::handler::Capability;
use crate::instantiate::BaseExporter;
use crate::report::ExportReport;
use crate::scene::{ObjectId, SceneGraph, SceneGraphExt};

impl ExtensionPipeline {
    /// Export `scene` through `exporter`, injecting every emitted extension
    ///
    /// Objects are numbered by a pre-order walk from the scene roots; the
    /// base exporter must write node `i` for the `i`-th object it is given.
    pub async fn export(
        &self,
        scene: &dyn SceneGraph,
        exporter: &dyn BaseExporter,
        cancel: &CancellationToken,
    ) -> PipelineResult<ExportOutput> {
        let handlers = self.registry.snapshot();
        let objects = scene.walk();
        let mut report = ExportReport::default();

        log::debug!(
            "Exporting {} objects with {} registered handlers",
            objects.len(),
            handlers.len()
        );

        let result = {
            let mut ctx = ExportContext::new(scene, handlers);
            let result = self
                .run_export(&mut ctx, &objects, exporter, &mut report, cancel)
                .await;
            ctx.dispose();
            result
        };

        let document = match result {
            Ok(document) => document,
            Err(e) => {
                log::error!("Export aborted: {}", e);
                return Err(e);
            }
        };

        let bytes = document.to_bytes()?;
        log::info!(
            "Exported {} nodes: {} extensions emitted, {} diagnostics",
            objects.len(),
            report.emitted.len(),
            report.diagnostics.len()
        );

        Ok(ExportOutput {
            bytes,
            document,
            report,
        })
    }

    async fn run_export(
        &self,
        ctx: &mut ExportContext<'_>,
        objects: &[ObjectId],
        exporter: &dyn BaseExporter,
        report: &mut ExportReport,
        cancel: &CancellationToken,
    ) -> PipelineResult<Document> {
        let chunk = self.config.effective_chunk_size();
        for (node, &object) in objects.iter().enumerate() {
            ctx.map_object(node, object);
            if (node + 1) % chunk == 0 {
                yield_now().await;
                ensure_live(cancel)?;
            }
        }
        ctx.advance(ExportState::ObjectsMapped);

        let mut blocks = EmittedBlocks::new();

        self.export_node_blocks(ctx, objects, &mut blocks, report, cancel)
            .await?;
        ctx.advance(ExportState::NodeHandlersRun);

        self.export_document_blocks(ctx, &mut blocks, report, cancel)
            .await?;
        ctx.advance(ExportState::DocumentHandlersRun);

        ensure_live(cancel)?;
        let base = exporter.export(ctx.scene(), objects)?;
        let mut document = void_gltf::parse(&base)?;

        inject(&mut document, blocks, &self.config, report)?;
        ctx.advance(ExportState::Injected);

        Ok(document)
    }

    /// Node-level payloads for every object, handlers in priority order
    async fn export_node_blocks(
        &self,
        ctx: &mut ExportContext<'_>,
        objects: &[ObjectId],
        blocks: &mut EmittedBlocks,
        report: &mut ExportReport,
        cancel: &CancellationToken,
    ) -> PipelineResult<()> {
        let handlers = ctx.handlers();
        let node_handlers = handlers.with_capability(Capability::Node);
        let chunk = self.config.effective_chunk_size();

        for (node, &object) in objects.iter().enumerate() {
            for handler in node_handlers {
                let Some(node_handler) = handler.node() else {
                    continue;
                };

                ensure_live(cancel)?;
                let result = self
                    .guarded(node_handler.export_node(node, object, ctx, cancel))
                    .await;
                report.handler_calls += 1;

                match result {
                    Ok(Some(block)) => {
                        log::debug!("Exported '{}' for node {}", handler.name(), node);
                        blocks.push_node(node, handler.name(), block);
                    }
                    Ok(None) => {}
                    Err(HandlerError::Cancelled) if cancel.is_cancelled() => {
                        return Err(PipelineError::Cancelled);
                    }
                    Err(error) => {
                        export_failure(report, &error, handler.name(), Some(node), Some(object));
                    }
                }
            }

            if (node + 1) % chunk == 0 {
                yield_now().await;
                ensure_live(cancel)?;
            }
        }

        Ok(())
    }

    /// Document-level payloads, after every node-level payload exists
    async fn export_document_blocks(
        &self,
        ctx: &mut ExportContext<'_>,
        blocks: &mut EmittedBlocks,
        report: &mut ExportReport,
        cancel: &CancellationToken,
    ) -> PipelineResult<()> {
        let handlers = ctx.handlers();

        for handler in handlers.all() {
            let generic = handler.capabilities().is_generic_only();
            if handler.document().is_none() && !generic {
                continue;
            }

            ensure_live(cancel)?;
            let result = match handler.document() {
                Some(document_handler) => {
                    self.guarded(document_handler.export_document(ctx, cancel))
                        .await
                }
                None => self.guarded(handler.generic().export(ctx, cancel)).await,
            };
            report.handler_calls += 1;

            match result {
                Ok(Some(block)) => {
                    log::debug!("Exported document-level '{}'", handler.name());
                    blocks.push_document(handler.name(), block);
                }
                Ok(None) => {}
                Err(HandlerError::Cancelled) if cancel.is_cancelled() => {
                    return Err(PipelineError::Cancelled);
                }
                Err(error) => export_failure(report, &error, handler.name(), None, None),
            }
        }

        Ok(())
    }
}
