macro_rules! invalid_data {
    ($e:expr) => {
        return Err(::std::io::Error::new(
            ::std::io::ErrorKind::InvalidData,
            $e,
        ))
    };
    ($fmt:expr, $($arg:tt)+) => {
        return Err(::std::io::Error::new(
            ::std::io::ErrorKind::InvalidData,
            format!($fmt, $($arg)+),
        ))
    };
}
