//! Derive macro for Geode PDX serialization.
//!
//! # Example
//!
//! ```ignore
//! use geode_derive::PdxSerializable;
//!
//! #[derive(PdxSerializable)]
//! #[pdx(class_name = "com.example.Person")]
//! struct Person {
//!     #[pdx(identity)]
//!     id: i64,
//!     name: String,
//!     #[pdx(field_name = "emailAddress")]
//!     email: Option<String>,
//! }
//! ```

extern crate proc_macro;

mod pdx;

use proc_macro::TokenStream;

/// Derives the `PdxSerializable` trait for a struct.
///
/// Fields are written in declaration order.
///
/// # Attributes
///
/// ## Struct-level
/// - `#[pdx(class_name = "...")]` sets the class name shared with other
///   members (defaults to the Rust struct name).
///
/// ## Field-level
/// - `#[pdx(field_name = "...")]` overrides the wire field name.
/// - `#[pdx(identity)]` marks the field as part of the identity hash.
/// - `#[pdx(skip)]` leaves the field out; it is rebuilt with `Default`.
///
/// # Supported Field Types
///
/// `bool`, `i8`, `i16`, `i32`, `i64`, `f32`, `f64`, `char`, `String`,
/// `DateTime<Utc>`, `Value`, `Vec<T>` of the primitive types, `Vec<String>`,
/// `Vec<Value>`, `Vec<Vec<u8>>`, `Option` of any of the non-scalar ones,
/// and any other `PdxSerializable` type, which is written as a nested object.
#[proc_macro_derive(PdxSerializable, attributes(pdx))]
pub fn derive_pdx(input: TokenStream) -> TokenStream {
    pdx::derive_pdx_impl(input)
}
