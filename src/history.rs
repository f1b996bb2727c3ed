use nalgebra::Vector3;
use std::collections::VecDeque;

/// Fixed-capacity, newest-first sample history.
///
/// `push` puts the new value at index 0; once full, the oldest sample falls
/// off the back. Storage is allocated once and never grows past `capacity`.
#[derive(Clone, Debug)]
pub struct HistoryBuffer<T> {
    samples: VecDeque<T>,
    capacity: usize,
}

impl<T: Clone> HistoryBuffer<T> {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        HistoryBuffer {
            samples: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, value: T) {
        if self.samples.len() == self.capacity {
            self.samples.pop_back();
        }
        self.samples.push_front(value);
    }

    /// Up to `count` most recent samples, newest first.
    pub fn read(&self, count: usize) -> Vec<T> {
        self.samples.iter().take(count).cloned().collect()
    }

    pub fn latest(&self) -> Option<&T> {
        self.samples.front()
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// Signals that keep a rolling history for the charts and trail.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Signal {
    LinearAccel,
    OrientationEuler,
    OpticalFlow,
    Position,
}

impl Signal {
    pub const ALL: [Signal; 4] = [
        Signal::LinearAccel,
        Signal::OrientationEuler,
        Signal::OpticalFlow,
        Signal::Position,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Signal::LinearAccel => "linear_accel",
            Signal::OrientationEuler => "orientation_euler",
            Signal::OpticalFlow => "optical_flow",
            Signal::Position => "position",
        }
    }
}

/// The four display histories plus the consumer's read window.
#[derive(Clone, Debug)]
pub struct Histories {
    linear_accel: HistoryBuffer<Vector3<f32>>,
    orientation_euler: HistoryBuffer<Vector3<f32>>,
    optical_flow: HistoryBuffer<Vector3<f32>>,
    position: HistoryBuffer<Vector3<f32>>,
    display_length: usize,
}

impl Histories {
    pub fn new(capacity: usize, display_length: usize) -> Self {
        let mut histories = Histories {
            linear_accel: HistoryBuffer::new(capacity),
            orientation_euler: HistoryBuffer::new(capacity),
            optical_flow: HistoryBuffer::new(capacity),
            position: HistoryBuffer::new(capacity),
            display_length: 0,
        };
        histories.set_display_length(display_length);
        histories
    }

    pub fn buffer(&self, signal: Signal) -> &HistoryBuffer<Vector3<f32>> {
        match signal {
            Signal::LinearAccel => &self.linear_accel,
            Signal::OrientationEuler => &self.orientation_euler,
            Signal::OpticalFlow => &self.optical_flow,
            Signal::Position => &self.position,
        }
    }

    pub fn buffer_mut(&mut self, signal: Signal) -> &mut HistoryBuffer<Vector3<f32>> {
        match signal {
            Signal::LinearAccel => &mut self.linear_accel,
            Signal::OrientationEuler => &mut self.orientation_euler,
            Signal::OpticalFlow => &mut self.optical_flow,
            Signal::Position => &mut self.position,
        }
    }

    /// Push one sample to every history. Called once per applied record.
    pub fn push_all(
        &mut self,
        linear_accel: Vector3<f32>,
        orientation_euler: Vector3<f32>,
        optical_flow: Vector3<f32>,
        position: Vector3<f32>,
    ) {
        self.linear_accel.push(linear_accel);
        self.orientation_euler.push(orientation_euler);
        self.optical_flow.push(optical_flow);
        self.position.push(position);
    }

    pub fn read(&self, signal: Signal, count: usize) -> Vec<Vector3<f32>> {
        self.buffer(signal).read(count)
    }

    /// Read through the current display window.
    pub fn read_display(&self, signal: Signal) -> Vec<Vector3<f32>> {
        self.read(signal, self.display_length)
    }

    /// Clamped to capacity; never reallocates.
    pub fn set_display_length(&mut self, length: usize) -> usize {
        self.display_length = length.min(self.capacity());
        self.display_length
    }

    pub fn display_length(&self) -> usize {
        self.display_length
    }

    pub fn capacity(&self) -> usize {
        self.position.capacity()
    }
}
