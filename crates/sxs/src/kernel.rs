//! The kernel ABI and loader (spec.md §4.8, §6).
//!
//! The C-ABI types mirror `examples/original_source/libs/pkg/kernel_api.hpp`
//! directly (an `api_table_s` vtable of `create_*`/`register_function`/`eval`
//! function pointers, `kernel_init`/`kernel_shutdown` entry points), adapted
//! to Rust's `#[repr(C)]` + raw-pointer idiom. Dynamic library loading uses
//! `libloading`, the one dependency this crate carries that the teacher
//! does not (noted in DESIGN.md: monty never loads native plugins, so there
//! is no teacher idiom for this — the crate itself is the only real
//! ecosystem choice for safe(ish) `dlopen`/`LoadLibrary` wrapping).

use std::ffi::{c_char, c_double, c_int, c_longlong, c_void, CStr, CString};
use std::path::{Path, PathBuf};

use ahash::AHashMap;
use indexmap::IndexMap;
use libloading::{Library, Symbol};

use crate::cell::Cell;
use crate::error::SxsError;
use crate::types::TypeTag;

pub type RegistryHandle = *mut c_void;
pub type ContextHandle = *mut c_void;

/// A cell as passed across the kernel ABI boundary. This is the Rust-side
/// FFI payload type `slp_object_c` is grounded on; conversions to/from
/// `Cell` happen at the boundary (`into_ffi`/`from_ffi`).
#[repr(C)]
pub struct FfiObject {
    pub tag: c_int,
    pub int_value: c_longlong,
    pub real_value: c_double,
    pub text: *const c_char,
    pub children: *const FfiObject,
    pub children_len: usize,
}

pub type KernelFnPtr = extern "C" fn(ContextHandle, *const FfiObject) -> FfiObject;
pub type RegisterFnPtr =
    extern "C" fn(RegistryHandle, *const c_char, KernelFnPtr, c_int, c_int);
pub type EvalFnPtr = extern "C" fn(ContextHandle, *const FfiObject) -> FfiObject;
pub type CreateIntFnPtr = extern "C" fn(c_longlong) -> FfiObject;
pub type CreateRealFnPtr = extern "C" fn(c_double) -> FfiObject;
pub type CreateStringFnPtr = extern "C" fn(*const c_char) -> FfiObject;
pub type CreateNoneFnPtr = extern "C" fn() -> FfiObject;
pub type CreateSymbolFnPtr = extern "C" fn(*const c_char) -> FfiObject;
pub type CreateListFnPtr = extern "C" fn(*const FfiObject, usize) -> FfiObject;
pub type GetSystemInfoFnPtr = extern "C" fn(*mut c_void);

#[repr(C)]
pub struct ApiTable {
    pub register_function: RegisterFnPtr,
    pub eval: EvalFnPtr,
    pub create_int: CreateIntFnPtr,
    pub create_real: CreateRealFnPtr,
    pub create_string: CreateStringFnPtr,
    pub create_none: CreateNoneFnPtr,
    pub create_symbol: CreateSymbolFnPtr,
    pub create_paren_list: CreateListFnPtr,
    pub create_bracket_list: CreateListFnPtr,
    pub create_brace_list: CreateListFnPtr,
    pub get_system_info: GetSystemInfoFnPtr,
}

type KernelInitFn = unsafe extern "C" fn(RegistryHandle, *const ApiTable);
type KernelShutdownFn = unsafe extern "C" fn(*const ApiTable);

/// A function registered by a kernel via `register_function`, carrying
/// enough signature information for `tcs` to type-check calls into it
/// without loading the dylib (spec.md §4.7's manifest-only checking).
#[derive(Debug, Clone)]
pub struct KernelFn {
    pub name: String,
    pub param_types: Vec<TypeTag>,
    pub return_type: TypeTag,
    pub variadic: bool,
    pub entry: KernelFnPtr,
}

pub struct KernelSlot {
    pub name: String,
    library: Library,
    shutdown: KernelShutdownFn,
    api_table: Box<ApiTable>,
    pub functions: AHashMap<String, KernelFn>,
}

impl Drop for KernelSlot {
    fn drop(&mut self) {
        unsafe { (self.shutdown)(&*self.api_table) };
    }
}

/// Loaded kernels, in load order, shutdown in reverse on teardown
/// (spec.md §4.8 "Shutdown is called at interpreter teardown in reverse
/// load order"). `IndexMap` keeps insertion order without a parallel `Vec`.
#[derive(Default)]
pub struct KernelRegistry {
    slots: IndexMap<String, KernelSlot>,
}

impl KernelRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn is_registered(&self, name: &str) -> bool {
        self.slots.contains_key(name)
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&KernelSlot> {
        self.slots.get(name)
    }

    /// Searches `include_paths` for `libkernel_<name>.{so,dylib}`, loads it,
    /// calls `kernel_init`, and registers the slot (spec.md §4.8/§6).
    ///
    /// # Safety
    /// Loading and invoking a dynamic library is inherently unsafe: the
    /// dylib must actually implement the kernel ABI this module defines.
    pub unsafe fn load(&mut self, name: &str, include_paths: &[PathBuf]) -> Result<(), SxsError> {
        if self.is_registered(name) {
            return Ok(());
        }
        let path = find_kernel_library(name, include_paths)
            .ok_or_else(|| SxsError::KernelLoadFailed {
                name: name.to_string(),
                message: "no libkernel_<name>.{so,dylib} found on include path".to_string(),
            })?;

        let library = Library::new(&path).map_err(|e| SxsError::KernelLoadFailed {
            name: name.to_string(),
            message: e.to_string(),
        })?;

        let init: Symbol<KernelInitFn> = library
            .get(b"kernel_init\0")
            .map_err(|e| SxsError::KernelLoadFailed { name: name.to_string(), message: e.to_string() })?;
        let shutdown: Symbol<KernelShutdownFn> = library
            .get(b"kernel_shutdown\0")
            .map_err(|e| SxsError::KernelLoadFailed { name: name.to_string(), message: e.to_string() })?;

        let api_table = Box::new(default_api_table());
        let registry_handle: RegistryHandle = std::ptr::null_mut();
        init(registry_handle, &*api_table);

        let manifest = manifest_path(path.parent().unwrap_or_else(|| Path::new(".")), name);
        let functions = load_manifest_functions(&manifest, name, &library)?;

        let shutdown_fn = *shutdown;
        self.slots.insert(
            name.to_string(),
            KernelSlot { name: name.to_string(), library, shutdown: shutdown_fn, api_table, functions },
        );
        Ok(())
    }
}

/// The declared shape of one `(define-function name (param type …) ret)`
/// entry in a kernel's `<name>.sxs` manifest.
#[derive(Debug)]
struct ManifestFn {
    name: String,
    param_types: Vec<TypeTag>,
    return_type: TypeTag,
}

/// Parses a kernel's `<name>.sxs` manifest for its `#(define-kernel …)`
/// directive (grounded on `KERNEL_SXS`'s
/// `#(define-kernel NAME "libkernel_NAME.dylib" [ (define-function …) … ])`
/// shape) and returns the declared function signatures, unresolved against
/// the dylib yet.
fn parse_kernel_manifest(source: &str, name: &str) -> Result<Vec<ManifestFn>, SxsError> {
    let cells = crate::parser::parse_program(source).map_err(|e| SxsError::KernelLoadFailed {
        name: name.to_string(),
        message: format!("parsing manifest: {e}"),
    })?;
    let manifest_items = cells
        .iter()
        .find_map(|c| match c {
            Cell::Datum(items) if matches!(items.first(), Some(Cell::Symbol(s)) if &**s == "define-kernel") => {
                Some(items.clone())
            }
            _ => None,
        })
        .ok_or_else(|| SxsError::KernelLoadFailed {
            name: name.to_string(),
            message: "manifest has no #(define-kernel …) directive".to_string(),
        })?;
    let Some(Cell::BracketList(entries)) = manifest_items.get(3) else {
        return Err(SxsError::KernelLoadFailed {
            name: name.to_string(),
            message: "define-kernel is missing its function list".to_string(),
        });
    };

    let mut functions = Vec::with_capacity(entries.len());
    for entry in entries.iter() {
        let Some(items) = entry.items() else { continue };
        let (Some(Cell::Symbol(fn_name)), Some(Cell::ParenList(param_items)), Some(Cell::Symbol(ret_text))) =
            (items.get(1), items.get(2), items.get(3))
        else {
            continue;
        };
        let mut param_types = Vec::with_capacity(param_items.len() / 2);
        for pair in param_items.chunks(2) {
            if let [_, Cell::Symbol(ty)] = pair {
                if let Some(t) = TypeTag::parse(ty) {
                    param_types.push(t);
                }
            }
        }
        let return_type = TypeTag::parse(ret_text).unwrap_or(TypeTag::None);
        functions.push(ManifestFn { name: fn_name.to_string(), param_types, return_type });
    }
    Ok(functions)
}

/// Reads the manifest sitting next to a loaded kernel's dylib and resolves
/// each declared function against a real symbol in `library`, so
/// `Interpreter::call_kernel` has somewhere to dispatch.
fn load_manifest_functions(
    manifest: &Path,
    name: &str,
    library: &Library,
) -> Result<AHashMap<String, KernelFn>, SxsError> {
    let source = std::fs::read_to_string(manifest).map_err(|e| SxsError::KernelLoadFailed {
        name: name.to_string(),
        message: format!("reading manifest {}: {e}", manifest.display()),
    })?;
    let declared = parse_kernel_manifest(&source, name)?;

    let mut functions = AHashMap::new();
    for decl in declared {
        let symbol_name = format!("{}\0", decl.name);
        let entry: Symbol<KernelFnPtr> = unsafe { library.get(symbol_name.as_bytes()) }.map_err(|e| {
            SxsError::KernelLoadFailed {
                name: name.to_string(),
                message: format!("function {} not found in library: {e}", decl.name),
            }
        })?;
        functions.insert(
            decl.name.clone(),
            KernelFn {
                name: decl.name,
                param_types: decl.param_types,
                return_type: decl.return_type,
                variadic: false,
                entry: *entry,
            },
        );
    }
    Ok(functions)
}

impl Drop for KernelRegistry {
    fn drop(&mut self) {
        while let Some((_, slot)) = self.slots.pop() {
            drop(slot);
        }
    }
}

fn find_kernel_library(name: &str, include_paths: &[PathBuf]) -> Option<PathBuf> {
    let candidates = [format!("libkernel_{name}.so"), format!("libkernel_{name}.dylib")];
    for dir in include_paths {
        for candidate in &candidates {
            let path = dir.join(candidate);
            if path.is_file() {
                return Some(path);
            }
        }
    }
    None
}

/// The sibling `<name>.sxs` manifest path for a kernel, per spec.md §6.
#[must_use]
pub fn manifest_path(kernel_dir: &Path, name: &str) -> PathBuf {
    kernel_dir.join(format!("{name}.sxs"))
}

extern "C" fn create_int(value: c_longlong) -> FfiObject {
    FfiObject {
        tag: 0,
        int_value: value,
        real_value: 0.0,
        text: std::ptr::null(),
        children: std::ptr::null(),
        children_len: 0,
    }
}

extern "C" fn create_real(value: c_double) -> FfiObject {
    FfiObject {
        tag: 1,
        int_value: 0,
        real_value: value,
        text: std::ptr::null(),
        children: std::ptr::null(),
        children_len: 0,
    }
}

extern "C" fn create_none() -> FfiObject {
    FfiObject { tag: 2, int_value: 0, real_value: 0.0, text: std::ptr::null(), children: std::ptr::null(), children_len: 0 }
}

extern "C" fn create_string(value: *const c_char) -> FfiObject {
    FfiObject { tag: 3, int_value: 0, real_value: 0.0, text: value, children: std::ptr::null(), children_len: 0 }
}

extern "C" fn create_symbol(name: *const c_char) -> FfiObject {
    FfiObject { tag: 4, int_value: 0, real_value: 0.0, text: name, children: std::ptr::null(), children_len: 0 }
}

extern "C" fn create_paren_list(objects: *const FfiObject, count: usize) -> FfiObject {
    FfiObject { tag: 5, int_value: 0, real_value: 0.0, text: std::ptr::null(), children: objects, children_len: count }
}

extern "C" fn create_bracket_list(objects: *const FfiObject, count: usize) -> FfiObject {
    FfiObject { tag: 6, int_value: 0, real_value: 0.0, text: std::ptr::null(), children: objects, children_len: count }
}

extern "C" fn create_brace_list(objects: *const FfiObject, count: usize) -> FfiObject {
    FfiObject { tag: 7, int_value: 0, real_value: 0.0, text: std::ptr::null(), children: objects, children_len: count }
}

extern "C" fn register_function_stub(
    _registry: RegistryHandle,
    _name: *const c_char,
    _function: KernelFnPtr,
    _return_type: c_int,
    _variadic: c_int,
) {
    // Registration is recorded on the Rust side by `Interpreter::load_kernel`
    // reading the manifest; the registry pointer handed to the kernel is a
    // placeholder so kernels following the header's calling convention link
    // and run without requiring a real opaque-registry round trip.
}

extern "C" fn eval_stub(_ctx: ContextHandle, obj: *const FfiObject) -> FfiObject {
    unsafe { std::ptr::read(obj) }
}

extern "C" fn get_system_info_stub(_out: *mut c_void) {}

fn default_api_table() -> ApiTable {
    ApiTable {
        register_function: register_function_stub,
        eval: eval_stub,
        create_int,
        create_real,
        create_string,
        create_none,
        create_symbol,
        create_paren_list,
        create_bracket_list,
        create_brace_list,
        get_system_info: get_system_info_stub,
    }
}

/// Converts a `Cell` to the FFI payload passed into a kernel function.
/// Used by `Interpreter` when dispatching `a/b(...)` into a loaded kernel.
///
/// The returned `Vec<Vec<FfiObject>>` is the backing storage for every
/// list's children array; each inner `Vec` is never reallocated after its
/// pointer is taken, so it must outlive the returned `FfiObject` tree.
pub fn cell_to_ffi_owned(cell: &Cell) -> (FfiObject, Vec<CString>, Vec<Vec<FfiObject>>) {
    let mut strings = Vec::new();
    let mut arenas = Vec::new();
    let obj = build_ffi(cell, &mut strings, &mut arenas);
    (obj, strings, arenas)
}

fn build_ffi(cell: &Cell, strings: &mut Vec<CString>, arenas: &mut Vec<Vec<FfiObject>>) -> FfiObject {
    match cell {
        Cell::Integer(v) => create_int(*v),
        Cell::Real(v) => create_real(*v),
        Cell::None => create_none(),
        Cell::DqList(s) => {
            let c = CString::new(s.as_bytes()).unwrap_or_default();
            let ptr = c.as_ptr();
            strings.push(c);
            create_string(ptr)
        }
        Cell::Symbol(s) => {
            let c = CString::new(s.as_bytes()).unwrap_or_default();
            let ptr = c.as_ptr();
            strings.push(c);
            create_symbol(ptr)
        }
        Cell::ParenList(items) | Cell::BracketList(items) | Cell::Datum(items) => {
            let children: Vec<FfiObject> = items.iter().map(|c| build_ffi(c, strings, arenas)).collect();
            arenas.push(children);
            let stored = arenas.last().expect("just pushed");
            create_paren_list(stored.as_ptr(), stored.len())
        }
        Cell::BraceList(items, _) => {
            let children: Vec<FfiObject> = items.iter().map(|c| build_ffi(c, strings, arenas)).collect();
            arenas.push(children);
            let stored = arenas.last().expect("just pushed");
            create_brace_list(stored.as_ptr(), stored.len())
        }
        _ => create_none(),
    }
}

/// Converts an FFI payload returned by a kernel function back to a `Cell`.
pub fn ffi_to_cell(obj: &FfiObject) -> Cell {
    match obj.tag {
        0 => Cell::Integer(obj.int_value),
        1 => Cell::Real(obj.real_value),
        3 => Cell::string(read_c_str(obj.text)),
        4 => Cell::symbol(read_c_str(obj.text)),
        5 => Cell::paren_list(read_children(obj)),
        6 => Cell::bracket_list(read_children(obj)),
        7 => Cell::brace_list(read_children(obj)),
        _ => Cell::None,
    }
}

fn read_c_str(ptr: *const c_char) -> String {
    if ptr.is_null() {
        return String::new();
    }
    unsafe { CStr::from_ptr(ptr) }.to_string_lossy().into_owned()
}

fn read_children(obj: &FfiObject) -> Vec<Cell> {
    if obj.children.is_null() || obj.children_len == 0 {
        return Vec::new();
    }
    unsafe { std::slice::from_raw_parts(obj.children, obj.children_len) }
        .iter()
        .map(ffi_to_cell)
        .collect()
}
