use crate::descriptor::{DescriptorField, DESCRIPTOR_LEN};
use crate::FlowField;
use wide::f32x4;

#[cfg(feature = "rayon")]
use rayon::prelude::*;

/// One message passing problem: every node searches the `labels x labels`
/// displacements within `radius` of its own integer offset.
///
/// Base graphs have one node per pixel. Reduced graphs merge 2x2 blocks of
/// the graph they came from.
#[derive(Debug, Clone)]
pub(crate) struct LevelGraph {
    pub width: usize,
    pub height: usize,
    pub radius: usize,
    pub labels: usize,
    pub offset_x: Vec<i32>,
    pub offset_y: Vec<i32>,
    /// Number of pixels a node stands for.
    pub weight: Vec<f32>,
    /// Data plus range cost, `[node][label_v][label_u]`.
    pub data: Vec<f32>,
    /// Truncation of a single pixel's matching cost.
    pub data_cap: f32,
    /// Smoothness slope and truncation between two neighbouring nodes.
    pub alpha: f32,
    pub d: f32,
}

impl LevelGraph {
    /// Build the pixel graph of two equally sized fields around the rounded
    /// displacements of `init`.
    pub fn new(
        field1: &DescriptorField,
        field2: &DescriptorField,
        init: &FlowField,
        radius: usize,
        alpha: f32,
        d: f32,
        gamma: f32,
    ) -> Self {
        let (width, height) = field1.dimensions();
        let labels = 2 * radius + 1;
        let offset_x: Vec<i32> = init.vx.iter().map(|v| v.round() as i32).collect();
        let offset_y: Vec<i32> = init.vy.iter().map(|v| v.round() as i32).collect();
        let mut data = vec![0f32; width * height * labels * labels];
        let block = labels * labels;

        let fill_row = |(y, row): (usize, &mut [f32])| {
            for (x, costs) in row.chunks_exact_mut(block).enumerate() {
                let node = y * width + x;
                let source = field1.descriptor(x, y);
                for (lv, costs) in costs.chunks_exact_mut(labels).enumerate() {
                    let v = offset_y[node] + lv as i32 - radius as i32;
                    let ty = (y as i64 + i64::from(v)).clamp(0, height as i64 - 1) as usize;
                    for (lu, cost) in costs.iter_mut().enumerate() {
                        let u = offset_x[node] + lu as i32 - radius as i32;
                        let tx = (x as i64 + i64::from(u)).clamp(0, width as i64 - 1) as usize;
                        let matching = matching_cost(source, field2.descriptor(tx, ty)).min(d);
                        *cost = matching + gamma * (u.abs() + v.abs()) as f32;
                    }
                }
            }
        };
        #[cfg(not(feature = "rayon"))]
        data.chunks_mut(width * block).enumerate().for_each(fill_row);
        #[cfg(feature = "rayon")]
        data.par_chunks_mut(width * block)
            .enumerate()
            .for_each(fill_row);

        Self {
            width,
            height,
            radius,
            labels,
            offset_x,
            offset_y,
            weight: vec![1.0; width * height],
            data,
            data_cap: d,
            alpha,
            d,
        }
    }

    pub fn len(&self) -> usize {
        self.width * self.height
    }

    /// Costs of node `node`, `[label_v][label_u]`.
    pub fn node_data(&self, node: usize) -> &[f32] {
        let block = self.labels * self.labels;
        &self.data[node * block..(node + 1) * block]
    }

    /// The node a pixel of the finer graph falls into.
    pub fn parent_of(&self, fine_width: usize, node: usize) -> usize {
        let (x, y) = (node % fine_width, node / fine_width);
        (y / 2) * self.width + x / 2
    }

    /// Merge 2x2 blocks into one node.
    ///
    /// The top left node of each block lends its offset to the merged node.
    /// Child costs are summed after being realigned to that offset; labels
    /// a child cannot express cost the data truncation per pixel it holds.
    pub fn reduce(&self) -> Self {
        let width = (self.width + 1) / 2;
        let height = (self.height + 1) / 2;
        let labels = self.labels;
        let block = labels * labels;
        let radius = self.radius as i32;
        let mut offset_x = Vec::with_capacity(width * height);
        let mut offset_y = Vec::with_capacity(width * height);
        let mut weight = vec![0f32; width * height];
        let mut data = vec![0f32; width * height * block];

        for cy in 0..height {
            for cx in 0..width {
                let anchor = 2 * cy * self.width + 2 * cx;
                offset_x.push(self.offset_x[anchor]);
                offset_y.push(self.offset_y[anchor]);
            }
        }

        for child in 0..self.len() {
            let (x, y) = (child % self.width, child / self.width);
            let parent = (y / 2) * width + x / 2;
            let dx = offset_x[parent] - self.offset_x[child];
            let dy = offset_y[parent] - self.offset_y[child];
            let missing = self.data_cap * self.weight[child];
            weight[parent] += self.weight[child];
            let child_costs = self.node_data(child);
            let parent_costs = &mut data[parent * block..(parent + 1) * block];
            for (lv, row) in parent_costs.chunks_exact_mut(labels).enumerate() {
                let lvc = lv as i32 + dy;
                for (lu, cost) in row.iter_mut().enumerate() {
                    let luc = lu as i32 + dx;
                    let inside = (0..=2 * radius).contains(&lvc) && (0..=2 * radius).contains(&luc);
                    *cost += if inside {
                        child_costs[lvc as usize * labels + luc as usize]
                    } else {
                        missing
                    };
                }
            }
        }

        Self {
            width,
            height,
            radius: self.radius,
            labels,
            offset_x,
            offset_y,
            weight,
            data,
            data_cap: self.data_cap,
            alpha: self.alpha * 2.0,
            d: self.d * 2.0,
        }
    }

    /// Truncated L1 smoothness between two displacements along one axis.
    pub fn smoothness(&self, a: i32, b: i32) -> f32 {
        (self.alpha * (a - b).abs() as f32).min(self.d)
    }

    /// Total energy of a labelling given as `(label_u, label_v)` per node.
    pub fn energy(&self, labels: &[(usize, usize)]) -> f64 {
        let displacement = |node: usize| {
            let (lu, lv) = labels[node];
            (
                self.offset_x[node] + lu as i32 - self.radius as i32,
                self.offset_y[node] + lv as i32 - self.radius as i32,
            )
        };
        let mut total = 0f64;
        for node in 0..self.len() {
            let (lu, lv) = labels[node];
            total += f64::from(self.node_data(node)[lv * self.labels + lu]);
            let (u, v) = displacement(node);
            let (x, y) = (node % self.width, node / self.width);
            let mut neighbours = [None, None];
            if x + 1 < self.width {
                neighbours[0] = Some(node + 1);
            }
            if y + 1 < self.height {
                neighbours[1] = Some(node + self.width);
            }
            for other in neighbours.into_iter().flatten() {
                let (ou, ov) = displacement(other);
                total += f64::from(self.smoothness(u, ou) + self.smoothness(v, ov));
            }
        }
        total
    }
}

/// Matching cost of two descriptors: their L1 distance over `sqrt(D)`.
///
/// Non-negative unit vectors are at most `sqrt(2 D)` apart in L1, so costs
/// lie in `[0, sqrt 2]` and a truncation of 1 only cuts the worst matches.
fn matching_cost(a: &[f32], b: &[f32]) -> f32 {
    l1_distance(a, b) / (DESCRIPTOR_LEN as f32).sqrt()
}

/// Sum of absolute differences of two descriptors.
fn l1_distance(a: &[f32], b: &[f32]) -> f32 {
    debug_assert!(a.len() == DESCRIPTOR_LEN && b.len() == DESCRIPTOR_LEN);
    a.chunks_exact(4)
        .zip(b.chunks_exact(4))
        .fold(f32x4::splat(0.), |acc, (a, b)| {
            let a = f32x4::new([a[0], a[1], a[2], a[3]]);
            let b = f32x4::new([b[0], b[1], b[2], b[3]]);
            acc + (a - b).abs()
        })
        .reduce_add()
}
