/*
 *  Best-first tree search driven by the heuristic evaluator.
 *
 *  The tree lives in an arena: nodes are held in a flat vector and refer to
 *  each other by index, so there are no per-node allocations and no cycles by
 *  construction.
 */

use crate::heuristic::prelude::*;
use crate::ninarow::prelude::*;

/// Expansions allowed per `complete_search` call before the search declares
/// itself finished. Exposed as a tunable on the search object.
pub const DEFAULT_EXPANSION_BUDGET: usize = 10_000;

pub type NodeId = usize;

/// One node of the game tree.
#[derive(Clone, Debug)]
pub struct GameTreeNode<const H: usize, const W: usize> {
    pub board: Board<H, W>,
    /// The move that produced this board; `None` at the root.
    pub move_in: Option<Move>,
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
    pub depth: usize,
    /// Black-positive value: the heuristic score at creation, replaced by
    /// minimax propagation once children exist.
    pub value: f64,
    pub expanded: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SearchState {
    /// The root has not been expanded yet.
    Idle,
    Running,
    Complete,
}

/// A sequential best-first search bound to a heuristic, a player to move, and
/// a root board at construction. Each `advance` performs one expansion along
/// the principal variation.
#[derive(Clone, Debug)]
pub struct BestFirstSearch<const H: usize, const W: usize> {
    nodes: Vec<GameTreeNode<H, W>>,
    player: Player,
    state: SearchState,
    expansions: usize,
    expansion_budget: usize,
    stopping_threshold: f64,
    pruning_threshold: f64,
}

pub type FourByNineBestFirstSearch = BestFirstSearch<BOARD_HEIGHT, BOARD_WIDTH>;

impl<const H: usize, const W: usize> BestFirstSearch<H, W> {
    /// Binds a search to its inputs. A root that is already terminal yields a
    /// search that is complete on arrival, with an empty child list.
    pub fn new(heuristic: &Heuristic<H, W>, player: Player, root: Board<H, W>) -> BestFirstSearch<H, W> {
        let terminal = root.game_has_ended();
        let value = match root.winner() {
            Some(winner) => winner.perspective() * TERMINAL_VALUE,
            None => 0.0,
        };
        let node = GameTreeNode {
            board: root,
            move_in: None,
            parent: None,
            children: vec![],
            depth: 0,
            value,
            expanded: terminal,
        };
        BestFirstSearch {
            nodes: vec![node],
            player,
            state: if terminal { SearchState::Complete } else { SearchState::Idle },
            expansions: 0,
            expansion_budget: DEFAULT_EXPANSION_BUDGET,
            stopping_threshold: heuristic.scalars().stopping_threshold,
            pruning_threshold: heuristic.scalars().pruning_threshold,
        }
    }

    pub fn with_expansion_budget(mut self, budget: usize) -> BestFirstSearch<H, W> {
        self.expansion_budget = budget;
        self
    }

    pub fn state(&self) -> SearchState {
        self.state
    }

    pub fn expansions(&self) -> usize {
        self.expansions
    }

    pub fn root(&self) -> &GameTreeNode<H, W> {
        &self.nodes[0]
    }

    pub fn node(&self, id: NodeId) -> &GameTreeNode<H, W> {
        &self.nodes[id]
    }

    /// Every node of the tree, root first.
    pub fn get_tree(&self) -> &[GameTreeNode<H, W>] {
        &self.nodes
    }

    pub fn children_of_root(&self) -> impl Iterator<Item = &GameTreeNode<H, W>> {
        self.nodes[0].children.iter().map(|&id| &self.nodes[id])
    }

    /// One expansion step. A no-op once the search is complete. The heuristic
    /// must be the one the search was constructed against.
    pub fn advance(&mut self, heuristic: &mut Heuristic<H, W>) -> Result<()> {
        if self.state == SearchState::Complete {
            return Ok(());
        }
        self.state = SearchState::Running;

        let leaf = self.select_leaf();
        if self.nodes[leaf].expanded {
            // The principal variation bottoms out in a proven node; there is
            // nothing left worth expanding.
            self.state = SearchState::Complete;
            return Ok(());
        }

        self.expand(leaf, heuristic);
        self.propagate(leaf);
        self.expansions += 1;

        if self.stopping_condition() || heuristic.sample_stop() {
            self.state = SearchState::Complete;
        }
        Ok(())
    }

    /// Advances until the search reports completion.
    pub fn complete_search(&mut self, heuristic: &mut Heuristic<H, W>) -> Result<()> {
        while self.state != SearchState::Complete {
            self.advance(heuristic)?;
        }
        Ok(())
    }

    /// Descends the principal variation: from each node, the child that is
    /// best for that node's player to move. Ties break toward the lowest
    /// square index.
    fn select_leaf(&self) -> NodeId {
        let mut current = 0;
        loop {
            let node = &self.nodes[current];
            if node.children.is_empty() {
                return current;
            }
            current = self.best_child_of(current).expect("non-empty children");
        }
    }

    fn best_child_of(&self, id: NodeId) -> Option<NodeId> {
        let node = &self.nodes[id];
        let sign = node.board.active_player().perspective();
        node.children
            .iter()
            .copied()
            .max_by(|&a, &b| {
                let left = sign * self.nodes[a].value;
                let right = sign * self.nodes[b].value;
                left.partial_cmp(&right)
                    .expect("sentinel values keep orderings total")
                    .then_with(|| {
                        // Prefer the lower square on equal values.
                        let pa = self.nodes[a].move_in.map_or(0, |m| m.position);
                        let pb = self.nodes[b].move_in.map_or(0, |m| m.position);
                        pb.cmp(&pa)
                    })
            })
    }

    /// The best child of the root, by the root player's perspective.
    pub fn best_child(&self) -> Option<&GameTreeNode<H, W>> {
        self.best_child_of(0).map(|id| &self.nodes[id])
    }

    /// Expands a leaf: terminal boards get their sentinel, anything else gets
    /// one child per surviving scored move. Children falling more than the
    /// pruning threshold behind the best sibling are never materialized.
    fn expand(&mut self, leaf: NodeId, heuristic: &mut Heuristic<H, W>) {
        let board = self.nodes[leaf].board;
        if board.game_has_ended() {
            self.nodes[leaf].value = match board.winner() {
                Some(winner) => winner.perspective() * TERMINAL_VALUE,
                None => 0.0,
            };
            self.nodes[leaf].expanded = true;
            return;
        }

        let mover = board.active_player();
        let sign = mover.perspective();
        let scored = heuristic.score_moves(&board, mover);
        let best = scored
            .iter()
            .map(|m| sign * m.value)
            .fold(f64::NEG_INFINITY, f64::max);

        let depth = self.nodes[leaf].depth + 1;
        for mv in scored {
            if sign * mv.value < best - self.pruning_threshold {
                continue;
            }
            let child = GameTreeNode {
                board: board.play_unchecked(&mv),
                move_in: Some(mv),
                parent: Some(leaf),
                children: vec![],
                depth,
                value: mv.value,
                expanded: false,
            };
            let id = self.nodes.len();
            self.nodes.push(child);
            self.nodes[leaf].children.push(id);
        }

        self.nodes[leaf].expanded = true;
        if let Some(value) = self.minimax_over_children(leaf) {
            self.nodes[leaf].value = value;
        }
    }

    fn minimax_over_children(&self, id: NodeId) -> Option<f64> {
        self.best_child_of(id).map(|best| self.nodes[best].value)
    }

    /// Walks from an updated node toward the root, refreshing each ancestor's
    /// value. Stops as soon as a value survives unchanged.
    fn propagate(&mut self, from: NodeId) {
        let mut current = self.nodes[from].parent;
        while let Some(id) = current {
            let updated = match self.minimax_over_children(id) {
                Some(value) => value,
                None => break,
            };
            if updated == self.nodes[id].value {
                break;
            }
            self.nodes[id].value = updated;
            current = self.nodes[id].parent;
        }
    }

    /// Whether the search has earned completion: a proven root, an exhausted
    /// expansion budget, or a decisive value spread between the best and
    /// second-best root children.
    fn stopping_condition(&self) -> bool {
        if self.nodes[0].value.abs() >= TERMINAL_VALUE {
            return true;
        }
        if self.expansions >= self.expansion_budget {
            return true;
        }
        let sign = self.player.perspective();
        let mut values: Vec<f64> = self.nodes[0]
            .children
            .iter()
            .map(|&id| sign * self.nodes[id].value)
            .collect();
        if values.len() >= 2 {
            values.sort_by(|a, b| b.partial_cmp(a).expect("total order"));
            if values[0] - values[1] > self.stopping_threshold {
                return true;
            }
        }
        false
    }

    /// The length, in plies, of the current principal variation.
    pub fn depth_of_pv(&self) -> usize {
        self.nodes[self.select_leaf()].depth
    }

    /// The principal variation itself.
    pub fn principal_variation(&self) -> Vec<Move> {
        let mut out = vec![];
        let mut current = 0;
        while let Some(next) = self.best_child_of(current) {
            if let Some(mv) = self.nodes[next].move_in {
                out.push(mv);
            }
            current = next;
        }
        out
    }

    /// Mean child count over expanded nodes that produced children.
    pub fn average_branching_factor(&self) -> f64 {
        let mut parents = 0usize;
        let mut children = 0usize;
        for node in &self.nodes {
            if node.expanded && !node.children.is_empty() {
                parents += 1;
                children += node.children.len();
            }
        }
        if parents == 0 {
            return 0.0;
        }
        children as f64 / parents as f64
    }
}
