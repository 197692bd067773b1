// Copyright 2024 The lispr Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! A precise, two-space copying garbage collector.
//!
//! Every heap object begins with a [`Header`] (`type_id` plus a `forward`
//! pointer used only during collection). Types register themselves with
//! [`Gc::add_type`], handing over four operations: the object's alignment,
//! how to measure its size, how to copy it (recursively copying any child
//! pointers into to-space), and a cursor over its children used only by the
//! out-of-memory recovery path.
//!
//! Collection copies everything reachable from the root set into the
//! currently-inactive arena, then swaps active and inactive. If copying runs
//! out of space mid-collection we do not unwind: we clear every forwarding
//! pointer written so far, grow the inactive arena, and retry the whole
//! cycle from scratch.

use std::cell::Cell;
use std::collections::HashSet;
use std::ptr;

use crate::arena::Arena;

const INITIAL_REGION_SIZE: usize = 4096;

pub type TypeId = u32;

#[repr(C)]
pub struct Header {
    pub type_id: TypeId,
    pub forward: *mut u8,
}

/// A type's contribution to the collector: how big its instances are, how
/// to copy one, and how to walk its children.
#[derive(Clone, Copy)]
pub struct TypeInfo {
    pub align: usize,
    pub size_fn: fn(*mut u8) -> usize,
    pub copy_fn: fn(&mut Gc, *mut u8, *mut u8),
    /// `children_fn(obj, position)` returns the child following `position`
    /// (a null `position` asks for the first child), or null when there is
    /// no next child. Types with no children (symbols, strings, numbers)
    /// can just always return null.
    pub children_fn: fn(*mut u8, *mut u8) -> *mut u8,
}

pub struct Gc {
    active: Arena,
    inactive: Arena,
    types: Vec<TypeInfo>,
    roots: Vec<*const Cell<*mut u8>>,
    collecting: bool,
    oom: bool,
    pub(crate) allocations: u64,
    pub(crate) collections: u64,
}

impl Gc {
    pub fn new() -> Gc {
        Gc {
            active: Arena::new(INITIAL_REGION_SIZE),
            inactive: Arena::new(INITIAL_REGION_SIZE),
            types: Vec::new(),
            roots: Vec::new(),
            collecting: false,
            oom: false,
            allocations: 0,
            collections: 0,
        }
    }

    pub fn add_type(&mut self, info: TypeInfo) -> TypeId {
        self.types.push(info);
        (self.types.len() - 1) as TypeId
    }

    /// Registers `cell` as a root. `cell` must point at storage that lives
    /// at least as long as the matching call to [`Gc::unroot`] and that is
    /// never moved in the meantime — this is the same stack discipline the
    /// original implementation enforced by hand with paired root/unroot
    /// calls; [`crate::gc::Rooted`] upholds it for callers.
    pub fn root(&mut self, cell: *const Cell<*mut u8>) {
        debug_assert!(!self.collecting, "cannot root while collecting");
        self.roots.push(cell);
    }

    /// Roots are an unordered set: this removes one entry matching `cell`,
    /// not necessarily the most recently added one.
    pub fn unroot(&mut self, cell: *const Cell<*mut u8>) {
        debug_assert!(!self.collecting, "cannot unroot while collecting");
        if let Some(pos) = self.roots.iter().rposition(|&c| ptr::eq(c, cell)) {
            self.roots.swap_remove(pos);
        }
    }

    pub fn alloc(&mut self, type_id: TypeId, size: usize, align: usize) -> *mut u8 {
        self.allocations += 1;
        if let Some(p) = self.active.alloc_bytes(size, align) {
            return self.init_header(p, type_id);
        }
        self.collect();
        if let Some(p) = self.active.alloc_bytes(size, align) {
            return self.init_header(p, type_id);
        }
        log::debug!("gc: active arena still too small after collection, growing");
        let new_cap = (self.active.capacity() * 2).max(size + INITIAL_REGION_SIZE);
        self.active = Arena::new(new_cap);
        let p = self
            .active
            .alloc_bytes(size, align)
            .expect("arena grown to fit allocation but still failed");
        self.init_header(p, type_id)
    }

    fn init_header(&mut self, p: ptr::NonNull<u8>, type_id: TypeId) -> *mut u8 {
        let header = unsafe { &mut *(p.as_ptr() as *mut Header) };
        header.type_id = type_id;
        header.forward = ptr::null_mut();
        p.as_ptr()
    }

    /// Copies `old` into to-space if it hasn't been copied yet this pass,
    /// returning its new address. A null pointer (our NIL representation)
    /// passes straight through.
    pub fn copy_object(&mut self, old: *mut u8) -> *mut u8 {
        if old.is_null() || self.oom {
            return old;
        }
        let header = unsafe { &mut *(old as *mut Header) };
        if !header.forward.is_null() {
            return header.forward;
        }
        let type_id = header.type_id as usize;
        let (size, align, copy_fn) = {
            let info = &self.types[type_id];
            ((info.size_fn)(old), info.align, info.copy_fn)
        };
        let new = match self.inactive.alloc_bytes(size, align) {
            Some(p) => p.as_ptr(),
            None => {
                self.oom = true;
                return old;
            }
        };
        header.forward = new;
        copy_fn(self, old, new);
        new
    }

    pub fn collect(&mut self) {
        self.collections += 1;
        log::debug!("gc: collection begin ({} live roots)", self.roots.len());
        loop {
            self.collecting = true;
            self.oom = false;
            let roots: Vec<*const Cell<*mut u8>> = self.roots.clone();
            for cell_ptr in &roots {
                let cell = unsafe { &**cell_ptr };
                let p = cell.get();
                if p.is_null() {
                    continue;
                }
                let new_p = self.copy_object(p);
                cell.set(new_p);
                if self.oom {
                    break;
                }
            }
            if self.oom {
                log::debug!("gc: ran out of to-space mid-collection, growing and retrying");
                self.clear_forwarding();
                let new_cap = self.inactive.capacity() * 2;
                self.inactive = Arena::new(new_cap.max(INITIAL_REGION_SIZE));
                continue;
            }
            std::mem::swap(&mut self.active, &mut self.inactive);
            self.inactive.reset();
            self.collecting = false;
            log::debug!("gc: collection end, active arena now {} bytes used", self.active.used());
            return;
        }
    }

    /// Clears every forwarding pointer reachable from the roots, using each
    /// type's children cursor. Needed before retrying a collection that ran
    /// out of to-space, since the partially-copied forward pointers point
    /// into an arena we are about to discard. A non-null `forward` doubles
    /// as a visited marker, so this also safely handles cycles.
    fn clear_forwarding(&mut self) {
        let mut seen = HashSet::new();
        let roots: Vec<*const Cell<*mut u8>> = self.roots.clone();
        for cell_ptr in roots {
            let cell = unsafe { &*cell_ptr };
            let p = cell.get();
            if !p.is_null() {
                self.clear_forwarding_object(p, &mut seen);
            }
        }
    }

    fn clear_forwarding_object(&mut self, obj: *mut u8, seen: &mut HashSet<*mut u8>) {
        if !seen.insert(obj) {
            return;
        }
        let header = unsafe { &mut *(obj as *mut Header) };
        header.forward = ptr::null_mut();
        let type_id = header.type_id as usize;
        let children_fn = self.types[type_id].children_fn;
        let mut position: *mut u8 = ptr::null_mut();
        loop {
            let child = children_fn(obj, position);
            if child.is_null() {
                break;
            }
            self.clear_forwarding_object(child, seen);
            position = child;
        }
    }
}

impl Default for Gc {
    fn default() -> Gc {
        Gc::new()
    }
}

/// An RAII root: roots `value` for as long as it is alive, unrooting it on
/// drop. Mirrors the paired root/unroot discipline of the system this is
/// based on, but as a smart pointer instead of manual calls.
///
/// The cell lives in its own heap allocation rather than inline in
/// `Rooted` itself, so the address handed to [`Gc::root`] stays valid even
/// if the `Rooted` is later moved — e.g. as a `HashMap` value across a
/// rehash, or as a struct field returned by value out of a constructor.
pub struct Rooted<T> {
    gc: *mut Gc,
    cell: Box<Cell<*mut u8>>,
    _marker: std::marker::PhantomData<T>,
}

impl<T> Rooted<T> {
    pub fn new(gc: &mut Gc, raw: *mut u8) -> Rooted<T> {
        let cell = Box::new(Cell::new(raw));
        gc.root(cell.as_ref() as *const Cell<*mut u8>);
        Rooted {
            gc: gc as *mut Gc,
            cell,
            _marker: std::marker::PhantomData,
        }
    }

    pub fn raw(&self) -> *mut u8 {
        self.cell.get()
    }

    pub fn set_raw(&self, raw: *mut u8) {
        self.cell.set(raw);
    }
}

impl<T> Drop for Rooted<T> {
    fn drop(&mut self) {
        unsafe {
            (*self.gc).unroot(self.cell.as_ref() as *const Cell<*mut u8>);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[repr(C)]
    struct Pair {
        header: Header,
        a: *mut u8,
        b: *mut u8,
    }

    fn pair_size(_: *mut u8) -> usize {
        std::mem::size_of::<Pair>()
    }

    fn pair_copy(gc: &mut Gc, old: *mut u8, new: *mut u8) {
        unsafe {
            let old_pair = &*(old as *const Pair);
            let a = gc.copy_object(old_pair.a);
            let b = gc.copy_object(old_pair.b);
            let new_pair = &mut *(new as *mut Pair);
            new_pair.header.type_id = old_pair.header.type_id;
            new_pair.header.forward = ptr::null_mut();
            new_pair.a = a;
            new_pair.b = b;
        }
    }

    fn pair_children(obj: *mut u8, position: *mut u8) -> *mut u8 {
        unsafe {
            let pair = &*(obj as *const Pair);
            if position.is_null() {
                if !pair.a.is_null() {
                    return pair.a;
                }
                return pair.b;
            }
            if ptr::eq(position, pair.a) {
                return pair.b;
            }
            ptr::null_mut()
        }
    }

    fn leaf_size(_: *mut u8) -> usize {
        std::mem::size_of::<Header>() + std::mem::size_of::<u64>()
    }

    fn leaf_copy(_: &mut Gc, old: *mut u8, new: *mut u8) {
        unsafe {
            std::ptr::copy_nonoverlapping(old, new, leaf_size(old));
            (*(new as *mut Header)).forward = ptr::null_mut();
        }
    }

    fn leaf_children(_: *mut u8, _: *mut u8) -> *mut u8 {
        ptr::null_mut()
    }

    #[test]
    fn collect_preserves_rooted_values() {
        let mut gc = Gc::new();
        let leaf_type = gc.add_type(TypeInfo {
            align: std::mem::align_of::<Header>(),
            size_fn: leaf_size,
            copy_fn: leaf_copy,
            children_fn: leaf_children,
        });
        let pair_type = gc.add_type(TypeInfo {
            align: std::mem::align_of::<Pair>(),
            size_fn: pair_size,
            copy_fn: pair_copy,
            children_fn: pair_children,
        });

        let leaf = gc.alloc(leaf_type, leaf_size(ptr::null_mut()), std::mem::align_of::<Header>());
        unsafe {
            *((leaf as usize + std::mem::size_of::<Header>()) as *mut u64) = 42;
        }
        let pair = gc.alloc(pair_type, pair_size(ptr::null_mut()), std::mem::align_of::<Pair>());
        unsafe {
            (*(pair as *mut Pair)).a = leaf;
            (*(pair as *mut Pair)).b = ptr::null_mut();
        }

        let rooted: Rooted<()> = Rooted::new(&mut gc, pair);
        gc.collect();
        let survived = rooted.raw();
        assert!(!survived.is_null());
        unsafe {
            let survived_pair = &*(survived as *const Pair);
            let survived_leaf = survived_pair.a;
            assert!(!survived_leaf.is_null());
            let value = *((survived_leaf as usize + std::mem::size_of::<Header>()) as *const u64);
            assert_eq!(value, 42);
        }
    }

    #[test]
    fn redundant_rooting_survives_single_collection() {
        let mut gc = Gc::new();
        let leaf_type = gc.add_type(TypeInfo {
            align: std::mem::align_of::<Header>(),
            size_fn: leaf_size,
            copy_fn: leaf_copy,
            children_fn: leaf_children,
        });
        let leaf = gc.alloc(leaf_type, leaf_size(ptr::null_mut()), std::mem::align_of::<Header>());
        let r1: Rooted<()> = Rooted::new(&mut gc, leaf);
        let r2: Rooted<()> = Rooted::new(&mut gc, leaf);
        let r3: Rooted<()> = Rooted::new(&mut gc, leaf);
        gc.collect();
        assert!(!r1.raw().is_null());
        assert_eq!(r1.raw(), r2.raw());
        assert_eq!(r2.raw(), r3.raw());
    }

    #[test]
    fn unroot_is_swap_remove_not_lifo() {
        let mut gc = Gc::new();
        let leaf_type = gc.add_type(TypeInfo {
            align: std::mem::align_of::<Header>(),
            size_fn: leaf_size,
            copy_fn: leaf_copy,
            children_fn: leaf_children,
        });
        let a = gc.alloc(leaf_type, leaf_size(ptr::null_mut()), std::mem::align_of::<Header>());
        let b = gc.alloc(leaf_type, leaf_size(ptr::null_mut()), std::mem::align_of::<Header>());
        let ra: Rooted<()> = Rooted::new(&mut gc, a);
        {
            let _rb: Rooted<()> = Rooted::new(&mut gc, b);
            // _rb drops here, unrooting b even though ra was rooted first.
        }
        gc.collect();
        assert!(!ra.raw().is_null());
    }
}
