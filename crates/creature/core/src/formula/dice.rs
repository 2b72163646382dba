use std::collections::VecDeque;

use super::node::Node;

/// A batch of identical dice the roll level needs outcomes for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub struct DiceRequest {
    pub number: u32,
    pub dice_size: u32,
}

/// Source of concrete dice outcomes for the roll level.
///
/// Returning `None` leaves the dice unrolled.
pub trait DiceSource {
    fn roll(&mut self, request: DiceRequest) -> Option<Vec<i64>>;
}

/// Never rolls. Used where dice must stay symbolic.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoDice;

impl DiceSource for NoDice {
    fn roll(&mut self, _request: DiceRequest) -> Option<Vec<i64>> {
        None
    }
}

impl<F> DiceSource for F
where
    F: FnMut(DiceRequest) -> Vec<i64>,
{
    fn roll(&mut self, request: DiceRequest) -> Option<Vec<i64>> {
        Some(self(request))
    }
}

/// Outcomes obtained ahead of time, handed out to matching requests.
///
/// A request takes the first queued outcome with the same count and size; when
/// none matches it takes the front of the queue.
#[derive(Clone, Debug, Default)]
pub struct QueuedRolls {
    queue: VecDeque<(DiceRequest, Vec<i64>)>,
}

impl QueuedRolls {
    pub fn new(requests: &[DiceRequest], outcomes: Vec<Vec<i64>>) -> Self {
        Self {
            queue: requests.iter().copied().zip(outcomes).collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

impl DiceSource for QueuedRolls {
    fn roll(&mut self, request: DiceRequest) -> Option<Vec<i64>> {
        let position = self
            .queue
            .iter()
            .position(|(queued, _)| *queued == request)
            .unwrap_or(0);
        self.queue.remove(position).map(|(_, values)| values)
    }
}

/// Dice the roll level would ask for, in the order it asks.
///
/// Only dice whose count and size are already constant are listed.
pub fn pending_rolls(node: &Node) -> Vec<DiceRequest> {
    let mut requests = Vec::new();
    node.walk(&mut |node| {
        if let Node::Roll { count, size, .. } = node
            && let (Some(count), Some(size)) = (count.as_number(), size.as_number())
            && let Some(request) = dice_request(count, size)
        {
            requests.push(request);
        }
    });
    requests
}

pub(crate) fn dice_request(count: f64, size: f64) -> Option<DiceRequest> {
    if count < 0.0 || size < 1.0 || count.fract() != 0.0 || size.fract() != 0.0 {
        return None;
    }
    Some(DiceRequest {
        number: count as u32,
        dice_size: size as u32,
    })
}
