macro_rules! cfg_tcp {
    ($($item:item)*) => {
        $(
            #[cfg(feature = "tcp")]
            #[cfg_attr(docsrs, doc(cfg(feature = "tcp")))]
            $item
        )*
    }
}

macro_rules! cfg_udp {
    ($($item:item)*) => {
        $(
            #[cfg(feature = "udp")]
            #[cfg_attr(docsrs, doc(cfg(feature = "udp")))]
            $item
        )*
    }
}

macro_rules! cfg_websocket {
    ($($item:item)*) => {
        $(
            #[cfg(feature = "websocket")]
            #[cfg_attr(docsrs, doc(cfg(feature = "websocket")))]
            $item
        )*
    }
}

macro_rules! cfg_http2 {
    ($($item:item)*) => {
        $(
            #[cfg(feature = "http2")]
            #[cfg_attr(docsrs, doc(cfg(feature = "http2")))]
            $item
        )*
    }
}

macro_rules! cfg_grpc {
    ($($item:item)*) => {
        $(
            #[cfg(feature = "grpc")]
            #[cfg_attr(docsrs, doc(cfg(feature = "grpc")))]
            $item
        )*
    }
}

macro_rules! cfg_tls {
    ($($item:item)*) => {
        $(
            #[cfg(feature = "tls")]
            #[cfg_attr(docsrs, doc(cfg(feature = "tls")))]
            $item
        )*
    }
}

macro_rules! cfg_rt {
    ($($item:item)*) => {
        $(
            #[cfg(feature = "runtime")]
            #[cfg_attr(docsrs, doc(cfg(feature = "runtime")))]
            $item
        )*
    }
}
