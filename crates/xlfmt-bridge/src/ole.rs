//! Late-bound COM automation layer.
//!
//! Excel's object model is driven through `IDispatch`, VBScript-style:
//! resolve a member name to a DISPID, then `Invoke` it as a property get,
//! property put, or method call. [`ComObject`] wraps that, resolving
//! DISPIDs through the shared [`BindingStore`] so repeat runs skip the
//! `GetIDsOfNames` round-trips.
//!
//! A cached DISPID that the live object no longer recognizes is the
//! stale-bindings case and is reported as such, never retried here.

#![cfg(windows)]

use std::cell::RefCell;
use std::mem::ManuallyDrop;
use std::ptr;
use std::rc::Rc;

use windows::{
    core::{BSTR, GUID, HSTRING, PCWSTR},
    Win32::{
        Foundation::{DISP_E_EXCEPTION, DISP_E_MEMBERNOTFOUND, DISP_E_UNKNOWNNAME, VARIANT_BOOL},
        Globalization::GetSystemDefaultLCID,
        System::{
            Com::{
                CLSIDFromProgID, CoCreateInstance, IDispatch, CLSCTX_LOCAL_SERVER, DISPATCH_METHOD,
                DISPATCH_PROPERTYGET, DISPATCH_PROPERTYPUT, DISPPARAMS, EXCEPINFO,
            },
            Ole::DISPID_PROPERTYPUT,
            Variant::{VARIANT, VT_BOOL, VT_BSTR, VT_DISPATCH, VT_EMPTY, VT_I2, VT_I4, VT_NULL, VT_R8},
        },
    },
};

use xlfmt_protocol::ErrorKind;

use crate::bindings::BindingStore;

/// A bridge-side failure, classified for the wire.
#[derive(Debug)]
pub struct Fault {
    pub kind: ErrorKind,
    pub message: String,
}

impl Fault {
    pub fn other(message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::Other,
            message: message.into(),
        }
    }

    pub fn stale(message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::StaleBindings,
            message: message.into(),
        }
    }
}

pub type OpResult<T> = Result<T, Fault>;

// -- VARIANT construction helpers --
// The VARIANT struct wraps inner unions in ManuallyDrop, so fields are set
// with ptr::write.

/// Create a VARIANT containing a bool.
pub fn variant_bool(val: bool) -> VARIANT {
    unsafe {
        let mut v = VARIANT::default();
        let inner = &mut *v.Anonymous.Anonymous;
        ptr::write(&mut inner.vt, VT_BOOL);
        ptr::write(
            &mut inner.Anonymous.boolVal,
            VARIANT_BOOL(if val { -1 } else { 0 }),
        );
        v
    }
}

/// Create a VARIANT containing an i32.
pub fn variant_i32(val: i32) -> VARIANT {
    unsafe {
        let mut v = VARIANT::default();
        let inner = &mut *v.Anonymous.Anonymous;
        ptr::write(&mut inner.vt, VT_I4);
        ptr::write(&mut inner.Anonymous.lVal, val);
        v
    }
}

/// Create a VARIANT containing a BSTR string.
pub fn variant_str(val: &str) -> VARIANT {
    unsafe {
        let bstr = BSTR::from(val);
        let mut v = VARIANT::default();
        let inner = &mut *v.Anonymous.Anonymous;
        ptr::write(&mut inner.vt, VT_BSTR);
        ptr::write(&mut inner.Anonymous.bstrVal, ManuallyDrop::new(bstr));
        v
    }
}

/// Extract a bool from a VARIANT.
pub fn variant_get_bool(v: &VARIANT) -> Option<bool> {
    unsafe {
        if v.Anonymous.Anonymous.vt == VT_BOOL {
            Some(v.Anonymous.Anonymous.Anonymous.boolVal.0 != 0)
        } else {
            None
        }
    }
}

/// Extract an i32 from a VARIANT, accepting the integral VTs Excel
/// actually hands back for enumeration-valued properties.
pub fn variant_get_i32(v: &VARIANT) -> Option<i32> {
    unsafe {
        let vt = v.Anonymous.Anonymous.vt;
        let anon = &v.Anonymous.Anonymous.Anonymous;
        if vt == VT_I4 {
            Some(anon.lVal)
        } else if vt == VT_I2 {
            Some(anon.iVal as i32)
        } else if vt == VT_R8 {
            Some(anon.dblVal as i32)
        } else {
            None
        }
    }
}

/// Extract a string from a VARIANT.
pub fn variant_get_string(v: &VARIANT) -> Option<String> {
    unsafe {
        if v.Anonymous.Anonymous.vt == VT_BSTR {
            let bstr = &v.Anonymous.Anonymous.Anonymous.bstrVal;
            Some(bstr.to_string())
        } else {
            None
        }
    }
}

/// Extract an IDispatch from a VARIANT.
fn variant_get_dispatch(v: &VARIANT) -> Option<IDispatch> {
    unsafe {
        if v.Anonymous.Anonymous.vt == VT_DISPATCH {
            let opt_disp: &Option<IDispatch> = &v.Anonymous.Anonymous.Anonymous.pdispVal;
            opt_disp.clone()
        } else {
            None
        }
    }
}

/// Check if a VARIANT is VT_NULL. Excel reports mixed-state range
/// properties (e.g. Font.Bold over a partly bold range) as Null.
pub fn variant_is_null(v: &VARIANT) -> bool {
    unsafe { v.Anonymous.Anonymous.vt == VT_NULL }
}

/// Check if a VARIANT is empty or null.
pub fn variant_is_empty(v: &VARIANT) -> bool {
    unsafe {
        let vt = v.Anonymous.Anonymous.vt;
        vt == VT_EMPTY || vt == VT_NULL
    }
}

/// A DISPID together with where it came from. Invoke failures on cached
/// IDs are classified as stale bindings; fresh IDs can't be stale.
struct MemberId {
    dispid: i32,
    cached: bool,
}

// -- ComObject --

/// An `IDispatch` object labelled with its object-model kind
/// ("Application", "Range", ...). The kind scopes binding-cache keys.
#[derive(Clone)]
pub struct ComObject {
    inner: IDispatch,
    kind: &'static str,
    bindings: Rc<RefCell<BindingStore>>,
}

impl ComObject {
    /// Create a COM object from a ProgID string (e.g., "Excel.Application").
    /// `CLSCTX_LOCAL_SERVER` launches the application or attaches to a
    /// running instance.
    pub fn create_from_progid(
        progid: &str,
        kind: &'static str,
        bindings: Rc<RefCell<BindingStore>>,
    ) -> OpResult<Self> {
        unsafe {
            let hstr = HSTRING::from(progid);
            let clsid = CLSIDFromProgID(&hstr)
                .map_err(|e| Fault::other(format!("CLSIDFromProgID('{progid}') failed: {e}")))?;
            let disp: IDispatch = CoCreateInstance(&clsid, None, CLSCTX_LOCAL_SERVER)
                .map_err(|e| Fault::other(format!("CoCreateInstance for '{progid}' failed: {e}")))?;
            Ok(Self {
                inner: disp,
                kind,
                bindings,
            })
        }
    }

    fn wrap(&self, disp: IDispatch, kind: &'static str) -> ComObject {
        ComObject {
            inner: disp,
            kind,
            bindings: Rc::clone(&self.bindings),
        }
    }

    /// Resolve a member name to a DISPID, preferring the binding cache.
    fn member_id(&self, name: &str) -> OpResult<MemberId> {
        if let Some(dispid) = self.bindings.borrow().lookup(self.kind, name) {
            return Ok(MemberId {
                dispid,
                cached: true,
            });
        }

        let dispid = unsafe {
            let wide: Vec<u16> = name.encode_utf16().chain(std::iter::once(0)).collect();
            let pcwstr = PCWSTR(wide.as_ptr());
            let names = [pcwstr];
            let mut dispid = 0i32;
            self.inner
                .GetIDsOfNames(
                    &GUID::zeroed(),
                    names.as_ptr(),
                    1,
                    GetSystemDefaultLCID(),
                    &mut dispid,
                )
                .map_err(|e| {
                    Fault::other(format!(
                        "GetIDsOfNames('{}.{name}') failed: {e}",
                        self.kind
                    ))
                })?;
            dispid
        };

        self.bindings.borrow_mut().record(self.kind, name, dispid);
        Ok(MemberId {
            dispid,
            cached: false,
        })
    }

    /// Get a property value. Equivalent to VB's `obj.PropertyName`.
    pub fn get_property(&self, name: &str) -> OpResult<VARIANT> {
        let member = self.member_id(name)?;
        unsafe {
            let params = DISPPARAMS::default();
            let mut result = VARIANT::default();
            let mut except = EXCEPINFO::default();
            self.inner
                .Invoke(
                    member.dispid,
                    &GUID::zeroed(),
                    GetSystemDefaultLCID(),
                    DISPATCH_PROPERTYGET,
                    &params,
                    Some(&mut result),
                    Some(&mut except),
                    None,
                )
                .map_err(|e| self.invoke_fault(e, &except, name, &member))?;
            Ok(result)
        }
    }

    /// Set a property value. Equivalent to VB's `obj.PropertyName = value`.
    pub fn set_property(&self, name: &str, value: VARIANT) -> OpResult<()> {
        let member = self.member_id(name)?;
        unsafe {
            let mut args = [value];
            let mut named_args = [DISPID_PROPERTYPUT];
            let params = DISPPARAMS {
                rgvarg: args.as_mut_ptr(),
                rgdispidNamedArgs: named_args.as_mut_ptr(),
                cArgs: 1,
                cNamedArgs: 1,
            };
            let mut except = EXCEPINFO::default();
            self.inner
                .Invoke(
                    member.dispid,
                    &GUID::zeroed(),
                    GetSystemDefaultLCID(),
                    DISPATCH_PROPERTYPUT,
                    &params,
                    None,
                    Some(&mut except),
                    None,
                )
                .map_err(|e| self.invoke_fault(e, &except, name, &member))?;
            Ok(())
        }
    }

    /// Invoke a method with arguments in natural order (DISPPARAMS wants
    /// them reversed; this function handles that).
    pub fn invoke_method(&self, name: &str, args: &[VARIANT]) -> OpResult<VARIANT> {
        let member = self.member_id(name)?;
        unsafe {
            let mut reversed: Vec<VARIANT> = args.iter().rev().cloned().collect();
            let params = DISPPARAMS {
                rgvarg: if reversed.is_empty() {
                    std::ptr::null_mut()
                } else {
                    reversed.as_mut_ptr()
                },
                rgdispidNamedArgs: std::ptr::null_mut(),
                cArgs: reversed.len() as u32,
                cNamedArgs: 0,
            };
            let mut result = VARIANT::default();
            let mut except = EXCEPINFO::default();
            self.inner
                .Invoke(
                    member.dispid,
                    &GUID::zeroed(),
                    GetSystemDefaultLCID(),
                    DISPATCH_METHOD,
                    &params,
                    Some(&mut result),
                    Some(&mut except),
                    None,
                )
                .map_err(|e| self.invoke_fault(e, &except, name, &member))?;
            Ok(result)
        }
    }

    /// Get a child object (property that returns an IDispatch).
    pub fn get_child(&self, name: &str, kind: &'static str) -> OpResult<ComObject> {
        let variant = self.get_property(name)?;
        self.extract_child(&variant, name, kind)
    }

    /// Invoke a method and wrap the returned IDispatch object.
    pub fn invoke_child(
        &self,
        name: &str,
        args: &[VARIANT],
        kind: &'static str,
    ) -> OpResult<ComObject> {
        let variant = self.invoke_method(name, args)?;
        self.extract_child(&variant, name, kind)
    }

    /// Get an indexed property (e.g., `Worksheets("Sheet1")` or
    /// `Range("A1:B2")`).
    pub fn get_indexed(
        &self,
        name: &str,
        index: &VARIANT,
        kind: &'static str,
    ) -> OpResult<ComObject> {
        let member = self.member_id(name)?;
        unsafe {
            let mut args = [index.clone()];
            let params = DISPPARAMS {
                rgvarg: args.as_mut_ptr(),
                rgdispidNamedArgs: std::ptr::null_mut(),
                cArgs: 1,
                cNamedArgs: 0,
            };
            let mut result = VARIANT::default();
            let mut except = EXCEPINFO::default();
            self.inner
                .Invoke(
                    member.dispid,
                    &GUID::zeroed(),
                    GetSystemDefaultLCID(),
                    DISPATCH_PROPERTYGET,
                    &params,
                    Some(&mut result),
                    Some(&mut except),
                    None,
                )
                .map_err(|e| self.invoke_fault(e, &except, name, &member))?;
            self.extract_child(&result, name, kind)
        }
    }

    fn extract_child(
        &self,
        variant: &VARIANT,
        context: &str,
        kind: &'static str,
    ) -> OpResult<ComObject> {
        if let Some(disp) = variant_get_dispatch(variant) {
            Ok(self.wrap(disp, kind))
        } else if variant_is_empty(variant) {
            Err(Fault::other(format!(
                "'{}.{context}' returned empty/null, expected an object",
                self.kind
            )))
        } else {
            Err(Fault::other(format!(
                "'{}.{context}' returned a non-object VARIANT, expected VT_DISPATCH",
                self.kind
            )))
        }
    }

    /// Classify an Invoke failure. Member-not-found on a cached DISPID
    /// means the persisted bindings no longer match the live object model.
    fn invoke_fault(
        &self,
        err: windows::core::Error,
        except: &EXCEPINFO,
        name: &str,
        member: &MemberId,
    ) -> Fault {
        let code = err.code();
        if member.cached && (code == DISP_E_MEMBERNOTFOUND || code == DISP_E_UNKNOWNNAME) {
            return Fault::stale(format!(
                "cached DISPID {} for '{}.{name}' no longer resolves",
                member.dispid, self.kind
            ));
        }
        if code == DISP_E_EXCEPTION {
            let desc = if !except.bstrDescription.is_empty() {
                except.bstrDescription.to_string()
            } else {
                String::from("(no description)")
            };
            let source = if !except.bstrSource.is_empty() {
                except.bstrSource.to_string()
            } else {
                String::from("(no source)")
            };
            return Fault::other(format!(
                "COM exception in '{}.{name}': {desc} (source: {source})",
                self.kind
            ));
        }
        Fault::other(format!("Invoke('{}.{name}') failed: {err}", self.kind))
    }
}
