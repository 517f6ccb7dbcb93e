//! Coarse-to-fine dense correspondence by loopy belief propagation on the
//! dual-layer SIFT Flow graph.

mod distance_transform;
mod graph;
mod messages;

use crate::descriptor::DescriptorField;
use crate::pyramid::DescriptorPyramid;
use crate::{Error, FlowField, Parameters, Result};
use graph::LevelGraph;
use log::*;
use messages::Messages;
use ndarray::Array2;

/// Matches two descriptor fields into a [`FlowField`].
#[derive(Debug, Copy, Clone, Default, PartialEq)]
pub struct FlowSolver {
    parameters: Parameters,
}

impl FlowSolver {
    pub fn new(parameters: Parameters) -> Self {
        Self { parameters }
    }

    pub fn parameters(&self) -> &Parameters {
        &self.parameters
    }

    /// Integer displacement of every pixel of `field1` into `field2`.
    ///
    /// Fields of different size are rejected before any work is done. Past
    /// that point the configured number of sweeps always runs to completion.
    pub fn solve(&self, field1: &DescriptorField, field2: &DescriptorField) -> Result<FlowField> {
        if field1.dimensions() != field2.dimensions() {
            return Err(Error::InputDimensionMismatch {
                first: field1.dimensions(),
                second: field2.dimensions(),
            });
        }
        let p = &self.parameters;
        let pyramid1 = DescriptorPyramid::build(field1, p.nlevels())?;
        let pyramid2 = DescriptorPyramid::build(field2, p.nlevels())?;
        info!("Matching over {} pyramid levels", pyramid1.len());

        let mut flow: Option<FlowField> = None;
        for level in (0..pyramid1.len()).rev() {
            let (f1, f2) = (pyramid1.level(level), pyramid2.level(level));
            let (width, height) = f1.dimensions();
            let (init, radius, iterations) = match &flow {
                None => (
                    FlowField::zeros(width, height),
                    p.topwsize(),
                    p.n_top_iterations(),
                ),
                Some(coarser) => (coarser.resize(width, height), p.wsize(), p.n_iterations()),
            };
            debug!(
                "Level {}: {} x {}, radius {}, {} iterations",
                level, width, height, radius, iterations
            );
            flow = Some(self.solve_level(f1, f2, &init, radius, iterations));
        }
        Ok(flow.unwrap_or_else(|| FlowField::zeros(field1.width(), field1.height())))
    }

    /// Solve one pyramid level, warm starting the pixel graph from a stack
    /// of merged graphs.
    fn solve_level(
        &self,
        field1: &DescriptorField,
        field2: &DescriptorField,
        init: &FlowField,
        radius: usize,
        iterations: usize,
    ) -> FlowField {
        let p = &self.parameters;
        let base = LevelGraph::new(field1, field2, init, radius, p.alpha(), p.d(), p.gamma());
        let mut graphs = vec![base];
        for _ in 0..p.n_hierarchy() {
            let last = &graphs[graphs.len() - 1];
            if last.width == 1 && last.height == 1 {
                break;
            }
            let reduced = last.reduce();
            trace!("Hierarchy graph {} x {}", reduced.width, reduced.height);
            graphs.push(reduced);
        }

        let mut messages = Messages::zeros(&graphs[graphs.len() - 1]);
        for index in (0..graphs.len()).rev() {
            if index + 1 < graphs.len() {
                messages = messages.expand(&graphs[index + 1], &graphs[index]);
            }
            messages.run(&graphs[index], iterations);
        }

        let base = &graphs[0];
        let labels = messages.decode(base);
        debug!("Level energy {:.4}", base.energy(&labels));
        let radius = base.radius as i32;
        let displacement = |offsets: &[i32], pick: fn((usize, usize)) -> usize| {
            Array2::from_shape_fn((base.height, base.width), |(y, x)| {
                let node = y * base.width + x;
                (offsets[node] + pick(labels[node]) as i32 - radius) as f32
            })
        };
        FlowField {
            vx: displacement(&base.offset_x, |(lu, _)| lu),
            vy: displacement(&base.offset_y, |(_, lv)| lv),
        }
    }
}
