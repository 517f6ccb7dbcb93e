use super::distance_transform::truncated_l1;
use super::graph::LevelGraph;
use float_ord::FloatOrd;

#[cfg(feature = "rayon")]
use rayon::prelude::*;

/// The side a message arrives from.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum Direction {
    Left,
    Right,
    Up,
    Down,
}

const DIRECTIONS: [Direction; 4] = [
    Direction::Left,
    Direction::Right,
    Direction::Up,
    Direction::Down,
];

impl Direction {
    fn index(self) -> usize {
        self as usize
    }

    fn opposite(self) -> Self {
        match self {
            Direction::Left => Direction::Right,
            Direction::Right => Direction::Left,
            Direction::Up => Direction::Down,
            Direction::Down => Direction::Up,
        }
    }

    /// The neighbour of `node` on this side, if there is one.
    fn neighbour(self, node: usize, width: usize, height: usize) -> Option<usize> {
        let (x, y) = (node % width, node / width);
        match self {
            Direction::Left => (x > 0).then(|| node - 1),
            Direction::Right => (x + 1 < width).then(|| node + 1),
            Direction::Up => (y > 0).then(|| node - width),
            Direction::Down => (y + 1 < height).then(|| node + width),
        }
    }
}

/// Per-thread work buffers, one label vector each.
struct Scratch {
    first: Vec<f32>,
    second: Vec<f32>,
    envelope: Vec<f32>,
}

impl Scratch {
    fn new(labels: usize) -> Self {
        Self {
            first: vec![0.0; labels],
            second: vec![0.0; labels],
            envelope: vec![0.0; labels],
        }
    }
}

/// What each node of both layers believes before excluding a neighbour:
/// the sum of its spatial messages plus the message from the other layer.
struct Beliefs {
    horizontal: Vec<f32>,
    vertical: Vec<f32>,
}

/// Incoming messages of the dual-layer graph, `[node][direction][label]`.
///
/// The horizontal layer carries the `u` component of the displacement and
/// the vertical layer the `v` component.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Messages {
    labels: usize,
    horizontal: Vec<f32>,
    vertical: Vec<f32>,
}

impl Messages {
    pub fn zeros(graph: &LevelGraph) -> Self {
        let len = graph.len() * DIRECTIONS.len() * graph.labels;
        Self {
            labels: graph.labels,
            horizontal: vec![0.0; len],
            vertical: vec![0.0; len],
        }
    }

    fn message<'a>(&self, layer: &'a [f32], node: usize, direction: Direction) -> &'a [f32] {
        let start = (node * DIRECTIONS.len() + direction.index()) * self.labels;
        &layer[start..start + self.labels]
    }

    /// Sum of every message `layer` delivers to `node`.
    fn gather(&self, layer: &[f32], node: usize, out: &mut [f32]) {
        let stride = DIRECTIONS.len() * self.labels;
        out.fill(0.0);
        for message in layer[node * stride..(node + 1) * stride].chunks_exact(self.labels) {
            for (o, m) in out.iter_mut().zip(message) {
                *o += m;
            }
        }
    }

    /// Carry the messages of `coarse` down to the `fine` graph it was
    /// reduced from. Every node takes its parent's messages, relabelled to
    /// its own offset and clamped at the window edge.
    pub fn expand(&self, coarse: &LevelGraph, fine: &LevelGraph) -> Self {
        let mut expanded = Self::zeros(fine);
        let labels = self.labels;
        let last = labels as i32 - 1;
        for child in 0..fine.len() {
            let parent = coarse.parent_of(fine.width, child);
            let dx = fine.offset_x[child] - coarse.offset_x[parent];
            let dy = fine.offset_y[child] - coarse.offset_y[parent];
            for direction in DIRECTIONS {
                let start = (child * DIRECTIONS.len() + direction.index()) * labels;
                let horizontal = self.message(&self.horizontal, parent, direction);
                let vertical = self.message(&self.vertical, parent, direction);
                for l in 0..labels {
                    let lu = (l as i32 + dx).clamp(0, last) as usize;
                    let lv = (l as i32 + dy).clamp(0, last) as usize;
                    expanded.horizontal[start + l] = horizontal[lu];
                    expanded.vertical[start + l] = vertical[lv];
                }
            }
        }
        expanded
    }

    /// Run `iterations` synchronous sweeps over `graph`.
    pub fn run(&mut self, graph: &LevelGraph, iterations: usize) {
        let mut next = Self::zeros(graph);
        let mut beliefs = Beliefs {
            horizontal: vec![0.0; graph.len() * self.labels],
            vertical: vec![0.0; graph.len() * self.labels],
        };
        for _ in 0..iterations {
            self.sweep(graph, &mut beliefs, &mut next);
            std::mem::swap(self, &mut next);
        }
    }

    /// Read every message from `self` and write the updated ones to `next`.
    fn sweep(&self, graph: &LevelGraph, beliefs: &mut Beliefs, next: &mut Messages) {
        let labels = self.labels;
        let stride = DIRECTIONS.len() * labels;

        #[cfg(not(feature = "rayon"))]
        {
            let mut scratch = Scratch::new(labels);
            for (node, (bu, bv)) in beliefs
                .horizontal
                .chunks_mut(labels)
                .zip(beliefs.vertical.chunks_mut(labels))
                .enumerate()
            {
                self.believe(graph, node, bu, bv, &mut scratch);
            }
            let beliefs = &*beliefs;
            for (node, (hu, hv)) in next
                .horizontal
                .chunks_mut(stride)
                .zip(next.vertical.chunks_mut(stride))
                .enumerate()
            {
                self.send(graph, beliefs, node, hu, hv, &mut scratch);
            }
        }
        #[cfg(feature = "rayon")]
        {
            beliefs
                .horizontal
                .par_chunks_mut(labels)
                .zip(beliefs.vertical.par_chunks_mut(labels))
                .enumerate()
                .for_each_init(
                    || Scratch::new(labels),
                    |scratch, (node, (bu, bv))| self.believe(graph, node, bu, bv, scratch),
                );
            let beliefs = &*beliefs;
            next.horizontal
                .par_chunks_mut(stride)
                .zip(next.vertical.par_chunks_mut(stride))
                .enumerate()
                .for_each_init(
                    || Scratch::new(labels),
                    |scratch, (node, (hu, hv))| self.send(graph, beliefs, node, hu, hv, scratch),
                );
        }
    }

    /// Fill the beliefs of `node`. The message from the other layer is the
    /// min-marginal of the data term, which couples `u` and `v`.
    fn believe(
        &self,
        graph: &LevelGraph,
        node: usize,
        horizontal: &mut [f32],
        vertical: &mut [f32],
        scratch: &mut Scratch,
    ) {
        let labels = self.labels;
        let (hu, hv) = (&mut scratch.first, &mut scratch.second);
        self.gather(&self.horizontal, node, hu);
        self.gather(&self.vertical, node, hv);
        horizontal.fill(f32::INFINITY);
        vertical.fill(f32::INFINITY);
        for (lv, row) in graph.node_data(node).chunks_exact(labels).enumerate() {
            for (lu, &cost) in row.iter().enumerate() {
                horizontal[lu] = horizontal[lu].min(cost + hv[lv]);
                vertical[lv] = vertical[lv].min(cost + hu[lu]);
            }
        }
        for (b, h) in horizontal.iter_mut().zip(hu.iter()) {
            *b += h;
        }
        for (b, h) in vertical.iter_mut().zip(hv.iter()) {
            *b += h;
        }
    }

    /// Compute every message arriving at `node` from the beliefs of its
    /// neighbours, each without the neighbour's message from `node`.
    fn send(
        &self,
        graph: &LevelGraph,
        beliefs: &Beliefs,
        node: usize,
        horizontal_out: &mut [f32],
        vertical_out: &mut [f32],
        scratch: &mut Scratch,
    ) {
        let labels = self.labels;
        for direction in DIRECTIONS {
            let range = direction.index() * labels..(direction.index() + 1) * labels;
            let (hu_out, hv_out) = (&mut horizontal_out[range.clone()], &mut vertical_out[range]);
            let sender = match direction.neighbour(node, graph.width, graph.height) {
                Some(sender) => sender,
                None => {
                    hu_out.fill(0.0);
                    hv_out.fill(0.0);
                    continue;
                }
            };
            let beliefs_range = sender * labels..(sender + 1) * labels;

            let back = self.message(&self.horizontal, sender, direction.opposite());
            for ((h, b), m) in scratch
                .first
                .iter_mut()
                .zip(&beliefs.horizontal[beliefs_range.clone()])
                .zip(back)
            {
                *h = b - m;
            }
            let shift = graph.offset_x[node] - graph.offset_x[sender];
            truncated_l1(
                &scratch.first,
                shift,
                graph.alpha,
                graph.d,
                &mut scratch.envelope,
                hu_out,
            );

            let back = self.message(&self.vertical, sender, direction.opposite());
            for ((h, b), m) in scratch
                .first
                .iter_mut()
                .zip(&beliefs.vertical[beliefs_range])
                .zip(back)
            {
                *h = b - m;
            }
            let shift = graph.offset_y[node] - graph.offset_y[sender];
            truncated_l1(
                &scratch.first,
                shift,
                graph.alpha,
                graph.d,
                &mut scratch.envelope,
                hv_out,
            );
        }
    }

    /// The `(label_u, label_v)` of every node minimizing its data cost plus
    /// the messages of both layers. Ties go to the first label pair in
    /// row-major `[label_v][label_u]` order.
    pub fn decode(&self, graph: &LevelGraph) -> Vec<(usize, usize)> {
        let labels = self.labels;
        let mut hu = vec![0f32; labels];
        let mut hv = vec![0f32; labels];
        (0..graph.len())
            .map(|node| {
                self.gather(&self.horizontal, node, &mut hu);
                self.gather(&self.vertical, node, &mut hv);
                let costs = graph.node_data(node);
                let best = (0..labels * labels)
                    .min_by_key(|&i| FloatOrd(costs[i] + hu[i % labels] + hv[i / labels]))
                    .unwrap_or(0);
                (best % labels, best / labels)
            })
            .collect()
    }
}
