//! Helper macro generating port error enums with snake_case constructors.

macro_rules! define_port_error {
    (@ctor $variant:ident) => {
        ::paste::paste! {
            pub fn [<$variant:snake>]() -> Self {
                Self::$variant
            }
        }
    };

    (@ctor $variant:ident { $($field:ident : $ty:ty),* $(,)? }) => {
        define_port_error!(@ctor_impl $variant () () $( $field : $ty, )*);
    };

    (@ctor_impl $variant:ident ($($params:tt)*) ($($inits:tt)*) ) => {
        ::paste::paste! {
            pub fn [<$variant:snake>]($($params)*) -> Self {
                Self::$variant { $($inits)* }
            }
        }
    };

    (@ctor_impl $variant:ident ($($params:tt)*) ($($inits:tt)*) $field:ident : $ty:ty, $($rest:tt)*) => {
        define_port_error!(
            @ctor_impl
            $variant
            ($($params)* $field: impl Into<$ty>,)
            ($($inits)* $field: $field.into(),)
            $($rest)*
        );
    };
    (
        $(#[$outer:meta])*
        pub enum $name:ident {
            $(
                $(#[$variant_meta:meta])*
                $variant:ident $( { $($field:ident : $ty:ty),* $(,)? } )? => $message:expr
            ),* $(,)?
        }
    ) => {
        $(#[$outer])*
        #[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
        pub enum $name {
            $(
                $(#[$variant_meta])*
                #[error($message)]
                $variant $( { $($field : $ty),* } )?,
            )*
        }

        impl $name {
            $(
                define_port_error!(@ctor $variant $( { $($field : $ty),* } )?);
            )*
        }
    };
}

pub(crate) use define_port_error;

#[cfg(test)]
mod tests {
    //! Regression coverage for this module.
    define_port_error! {
        pub enum ProbePortError {
            Unreachable { message: String } => "unreachable: {message}",
            Rejected { status: u16 } => "rejected with {status}",
            Stalled { message: String, attempts: u32 } => "stalled: {message} ({attempts})",
            Closed => "closed",
        }
    }

    #[test]
    fn constructors_accept_str_for_string_fields() {
        let err = ProbePortError::unreachable("connreq:dev-1");
        assert_eq!(err.to_string(), "unreachable: connreq:dev-1");
    }

    #[test]
    fn constructors_preserve_non_string_types() {
        let err = ProbePortError::rejected(503_u16);
        assert_eq!(err.to_string(), "rejected with 503");
    }

    #[test]
    fn constructors_support_mixed_fields() {
        let err = ProbePortError::stalled("redis", 3_u32);
        assert_eq!(err.to_string(), "stalled: redis (3)");
    }

    #[test]
    fn unit_variants_get_nullary_constructors() {
        assert_eq!(ProbePortError::closed(), ProbePortError::Closed);
    }
}
