use std::alloc::{GlobalAlloc, Layout, System};
use std::sync::atomic::{AtomicUsize, Ordering};

use rust_dense::{Activation, DenseLayer, MissingPolicy, StackBuilder};

struct CountingAlloc {
    allocs: AtomicUsize,
    reallocs: AtomicUsize,
    deallocs: AtomicUsize,
    bytes: AtomicUsize,
}

impl CountingAlloc {
    const fn new() -> Self {
        Self {
            allocs: AtomicUsize::new(0),
            reallocs: AtomicUsize::new(0),
            deallocs: AtomicUsize::new(0),
            bytes: AtomicUsize::new(0),
        }
    }

    fn reset(&self) {
        self.allocs.store(0, Ordering::Relaxed);
        self.reallocs.store(0, Ordering::Relaxed);
        self.deallocs.store(0, Ordering::Relaxed);
        self.bytes.store(0, Ordering::Relaxed);
    }

    fn snapshot(&self) -> AllocSnapshot {
        AllocSnapshot {
            allocs: self.allocs.load(Ordering::Relaxed),
            reallocs: self.reallocs.load(Ordering::Relaxed),
            deallocs: self.deallocs.load(Ordering::Relaxed),
            bytes: self.bytes.load(Ordering::Relaxed),
        }
    }

    fn alloc_events(&self) -> usize {
        self.allocs.load(Ordering::Relaxed) + self.reallocs.load(Ordering::Relaxed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct AllocSnapshot {
    allocs: usize,
    reallocs: usize,
    deallocs: usize,
    bytes: usize,
}

unsafe impl GlobalAlloc for CountingAlloc {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        self.allocs.fetch_add(1, Ordering::Relaxed);
        self.bytes.fetch_add(layout.size(), Ordering::Relaxed);
        unsafe { System.alloc(layout) }
    }

    unsafe fn alloc_zeroed(&self, layout: Layout) -> *mut u8 {
        self.allocs.fetch_add(1, Ordering::Relaxed);
        self.bytes.fetch_add(layout.size(), Ordering::Relaxed);
        unsafe { System.alloc_zeroed(layout) }
    }

    unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) {
        self.deallocs.fetch_add(1, Ordering::Relaxed);
        unsafe { System.dealloc(ptr, layout) }
    }

    unsafe fn realloc(&self, ptr: *mut u8, layout: Layout, new_size: usize) -> *mut u8 {
        self.reallocs.fetch_add(1, Ordering::Relaxed);
        // Approximate accounting: record the new size.
        self.bytes.fetch_add(new_size, Ordering::Relaxed);
        unsafe { System.realloc(ptr, layout, new_size) }
    }
}

#[global_allocator]
static ALLOC: CountingAlloc = CountingAlloc::new();

// Single test in this binary so no other test thread allocates while we count.
#[test]
fn fprop_and_bprop_do_not_allocate_on_preallocated_buffers() {
    for policy in MissingPolicy::ALL {
        let layer = DenseLayer::<f32>::new_with_seed("hot", 32, 16, Activation::Tanh, policy, 0)
            .unwrap();
        let input: Vec<f32> = (0..32)
            .map(|i| {
                if i % 5 == 0 && policy != MissingPolicy::None {
                    f32::NAN
                } else {
                    i as f32 * 0.01
                }
            })
            .collect();
        let errors = vec![0.1_f32; 16];
        let mut scratch = layer.scratch();
        let mut out = vec![0.0_f32; 16];
        let mut grads = layer.gradients();
        let mut input_errors = vec![0.0_f32; 32];

        ALLOC.reset();
        let before = ALLOC.snapshot();
        for _ in 0..100 {
            layer.fprop_into(&input, &mut scratch, &mut out).unwrap();
            layer
                .bprop(
                    &errors,
                    &scratch,
                    grads.values_mut(),
                    Some(&mut input_errors),
                    1.0,
                )
                .unwrap();
        }
        let events = ALLOC.alloc_events();
        let after = ALLOC.snapshot();
        assert_eq!(
            events, 0,
            "policy {policy:?} allocated on the hot path: before={before:?} after={after:?}"
        );
    }

    let stack = StackBuilder::new(24)
        .unwrap()
        .add_layer(32, Activation::ReLU, MissingPolicy::Dense)
        .unwrap()
        .add_layer(8, Activation::Identity, MissingPolicy::None)
        .unwrap()
        .build_with_seed::<f64>(1)
        .unwrap();
    let mut input = vec![0.25_f64; 24];
    input[3] = f64::NAN;
    let errors = vec![-0.5_f64; 8];
    let mut scratch = stack.scratch();
    let mut out = vec![0.0_f64; 8];
    let mut grads = stack.gradients();

    ALLOC.reset();
    let before = ALLOC.snapshot();
    for _ in 0..100 {
        stack.fprop_into(&input, &mut scratch, &mut out).unwrap();
        stack
            .bprop(&errors, &mut scratch, grads.values_mut(), None, 0.5)
            .unwrap();
    }
    let events = ALLOC.alloc_events();
    let after = ALLOC.snapshot();
    assert_eq!(
        events, 0,
        "stack allocated on the hot path: before={before:?} after={after:?}"
    );
}
