//! Arena quadtree over edge segments

use crate::graph::{BBox, EdgeId};

#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    /// Children in SW, SE, NW, NE order, as indices into the arena
    Inner { children: [u32; 4] },
    /// Edges with at least one segment touching the cell, ascending
    Leaf { edges: Vec<EdgeId> },
}

#[derive(Debug, Clone, PartialEq)]
pub struct QuadTree {
    pub(crate) bbox: BBox,
    /// Pre-order: a parent always comes before its children
    pub(crate) cells: Vec<Cell>,
}

pub(crate) struct Limits {
    pub max_entries: usize,
    pub resolution_m: f64,
}

impl QuadTree {
    /// Build from (edge, segment box) items
    pub(crate) fn build(bbox: BBox, items: Vec<(EdgeId, BBox)>, limits: &Limits) -> Self {
        let mut tree = Self {
            bbox,
            cells: Vec::new(),
        };
        tree.build_cell(bbox, items, limits);
        tree
    }

    fn build_cell(&mut self, bbox: BBox, items: Vec<(EdgeId, BBox)>, limits: &Limits) -> u32 {
        let id = self.cells.len() as u32;
        let too_small = bbox.width_m().max(bbox.height_m()) / 2.0 < limits.resolution_m;
        if items.len() <= limits.max_entries || too_small {
            let mut edges: Vec<EdgeId> = items.into_iter().map(|(e, _)| e).collect();
            edges.sort_unstable();
            edges.dedup();
            self.cells.push(Cell::Leaf { edges });
            return id;
        }

        self.cells.push(Cell::Inner { children: [0; 4] });
        let mut children = [0u32; 4];
        for (slot, quadrant) in bbox.quadrants().into_iter().enumerate() {
            let inside: Vec<(EdgeId, BBox)> = items
                .iter()
                .filter(|(_, b)| quadrant.intersects(b))
                .copied()
                .collect();
            children[slot] = self.build_cell(quadrant, inside, limits);
        }
        self.cells[id as usize] = Cell::Inner { children };
        id
    }

    pub fn cell_count(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells
            .iter()
            .all(|c| matches!(c, Cell::Leaf { edges } if edges.is_empty()))
    }

    /// Every edge stored in a leaf that intersects `area`, each at most once
    pub fn query(&self, area: &BBox, out: &mut Vec<EdgeId>) {
        out.clear();
        if self.cells.is_empty() || !self.bbox.intersects(area) {
            return;
        }
        let mut stack = vec![(0u32, self.bbox)];
        while let Some((id, bbox)) = stack.pop() {
            match &self.cells[id as usize] {
                Cell::Leaf { edges } => out.extend_from_slice(edges),
                Cell::Inner { children } => {
                    for (child, quadrant) in children.iter().zip(bbox.quadrants()) {
                        if quadrant.intersects(area) {
                            stack.push((*child, quadrant));
                        }
                    }
                }
            }
        }
        out.sort_unstable();
        out.dedup();
    }

    /// Structural checks run after loading from disk
    pub(crate) fn validate(&self, edge_count: usize) -> Result<(), String> {
        if self.cells.is_empty() {
            return Err("no root cell".into());
        }
        for (id, cell) in self.cells.iter().enumerate() {
            match cell {
                Cell::Inner { children } => {
                    if let Some(c) = children
                        .iter()
                        .find(|&&c| c as usize <= id || c as usize >= self.cells.len())
                    {
                        return Err(format!("cell {id} has invalid child {c}"));
                    }
                }
                Cell::Leaf { edges } => {
                    if let Some(e) = edges.iter().find(|&&e| e as usize >= edge_count) {
                        return Err(format!("cell {id} references edge {e} outside the graph"));
                    }
                }
            }
        }
        Ok(())
    }
}
