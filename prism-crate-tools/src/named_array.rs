/// 创建一个带有索引的常量表：枚举的每个变体对应一个值
///
/// ```ignore
/// enumed_map!(pub RtGroup<u32>: {
///     RayGen: 0,
///     Miss: 1,
/// });
/// assert_eq!(RtGroup::COUNT, 2);
/// assert_eq!(*RtGroup::Miss.value(), 1);
/// ```
#[macro_export]
macro_rules! enumed_map {
    ($vis:vis $enum_name:ident<$vtype:ty>: { $($variant:ident: $value:expr),* $(,)? }) => {
        #[repr(usize)]
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        $vis enum $enum_name {
            $($variant,)*
        }

        #[allow(dead_code)]
        impl $enum_name {
            pub const COUNT: usize = $crate::count_indexed_array!($($variant),*);
            pub const ALL: [Self; Self::COUNT] = [$(Self::$variant,)*];

            // OnceLock 延迟初始化，允许 value 不是 const
            fn get_array() -> &'static [$vtype; Self::COUNT] {
                static ARRAY: std::sync::OnceLock<[$vtype; $crate::count_indexed_array!($($variant),*)]> =
                    std::sync::OnceLock::new();
                ARRAY.get_or_init(|| [$($value,)*])
            }

            pub fn value(self) -> &'static $vtype {
                &Self::get_array()[self as usize]
            }

            pub const fn index(self) -> usize {
                self as usize
            }

            pub const fn name(self) -> &'static str {
                match self {
                    $(Self::$variant => stringify!($variant),)*
                }
            }

            pub fn iter() -> impl Iterator<Item = Self> {
                Self::ALL.into_iter()
            }

            pub fn array() -> &'static [$vtype; Self::COUNT] {
                Self::get_array()
            }
        }
    };
}

/// 辅助宏，计算变体数量
#[macro_export]
macro_rules! count_indexed_array {
    () => (0);
    ($head:tt $(, $tail:tt)*) => (1 + $crate::count_indexed_array!($($tail),*));
}

#[cfg(test)]
mod tests {
    enumed_map!(Stage<&'static str>: {
        Vertex: "main_vs",
        Fragment: "main_ps",
        Compute: "main_cs",
    });

    #[test]
    fn test_enumed_map() {
        assert_eq!(Stage::COUNT, 3);
        assert_eq!(*Stage::Fragment.value(), "main_ps");
        assert_eq!(Stage::Compute.index(), 2);
        assert_eq!(Stage::Vertex.name(), "Vertex");

        let order: Vec<_> = Stage::iter().map(|s| s.index()).collect();
        assert_eq!(order, vec![0, 1, 2]);
        assert_eq!(Stage::array().len(), Stage::COUNT);
    }
}
