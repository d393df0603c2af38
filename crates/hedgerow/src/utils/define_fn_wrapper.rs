// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

/// Generates `Fn`-like wrapper types with consistent patterns.
///
/// The generated type wraps a function in an `Arc<dyn Fn...>`, providing
/// `Clone`, `Debug`, and a constructor. This is how user-provided callbacks
/// (classifiers, generators, observers) are stored in a thread-safe, clonable
/// way without inheritance-style traits.
///
/// # Syntax
///
/// ```rust,ignore
/// define_fn_wrapper!(TypeName<Generics>(Fn(args) -> ReturnType));
/// ```
macro_rules! define_fn_wrapper {
    // Name<Generic>(Fn(param_name: param_type, ...) -> return_type)
    ($name:ident<$($generics:ident),*>(Fn($($param_name:ident: $param_ty:ty),*) -> $return_ty:ty)) => {
        pub(crate) struct $name<$($generics),*>(std::sync::Arc<dyn Fn($($param_ty),*) -> $return_ty + Send + Sync>);

        impl<$($generics),*> $name<$($generics),*> {
            pub(crate) fn new<F>(callback: F) -> Self
            where
                F: Fn($($param_ty),*) -> $return_ty + Send + Sync + 'static,
            {
                Self(std::sync::Arc::new(callback))
            }

            pub(crate) fn call(&self, $($param_name: $param_ty),*) -> $return_ty {
                (self.0)($($param_name),*)
            }
        }

        impl<$($generics),*> Clone for $name<$($generics),*> {
            fn clone(&self) -> Self {
                Self(self.0.clone())
            }
        }

        impl<$($generics),*> std::fmt::Debug for $name<$($generics),*> {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.debug_struct(stringify!($name)).finish()
            }
        }
    };

    // Unnamed parameters, generic type, with return type.
    ($name:ident<$($generics:ident),*>(Fn($param1:ty, $param2:ty) -> $return_ty:ty)) => {
        $crate::utils::define_fn_wrapper!($name<$($generics),*>(Fn(arg1: $param1, arg2: $param2) -> $return_ty));
    };
    ($name:ident<$($generics:ident),*>(Fn($param1:ty) -> $return_ty:ty)) => {
        $crate::utils::define_fn_wrapper!($name<$($generics),*>(Fn(arg1: $param1) -> $return_ty));
    };

    // Unnamed parameters, generic type, unit return.
    ($name:ident<$($generics:ident),*>(Fn($param1:ty))) => {
        $crate::utils::define_fn_wrapper!($name<$($generics),*>(Fn(arg1: $param1) -> ()));
    };

    // Unnamed parameters, no generics.
    ($name:ident(Fn($param1:ty) -> $return_ty:ty)) => {
        $crate::utils::define_fn_wrapper!($name<>(Fn(arg1: $param1) -> $return_ty));
    };
    ($name:ident(Fn($param1:ty))) => {
        $crate::utils::define_fn_wrapper!($name<>(Fn(arg1: $param1) -> ()));
    };
}

pub(crate) use define_fn_wrapper;
